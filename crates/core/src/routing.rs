//! Route guards for the portal's three areas.

use serde::{Deserialize, Serialize};

use crate::models::profile::{Profile, Role};

pub const AUTH_ROUTE: &str = "/auth";
pub const ADMIN_ROUTE: &str = "/admin";
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// What the shell should do with a requested path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteDecision {
    /// Show the requested page.
    Render,
    /// Navigate to another path instead.
    Redirect(String),
    /// Show the "account pending approval" notice.
    PendingApproval,
}

fn under(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Where a signed-in user lands after authenticating.
#[must_use]
pub fn landing_route(profile: &Profile) -> &'static str {
    match profile.role {
        Role::Admin => ADMIN_ROUTE,
        Role::Lp => DASHBOARD_ROUTE,
    }
}

/// Decide how to handle `path` for the current user (`None` when signed
/// out).
///
/// - `/auth` always renders.
/// - Protected areas redirect signed-out users to `/auth`.
/// - An LP who is not approved sees the pending notice.
/// - Each role is sent to its own area when it asks for the other one.
/// - Anything else redirects to `/auth`.
#[must_use]
pub fn resolve_route(path: &str, profile: Option<&Profile>) -> RouteDecision {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };

    if under(path, AUTH_ROUTE) {
        return RouteDecision::Render;
    }

    let area = if under(path, ADMIN_ROUTE) {
        Role::Admin
    } else if under(path, DASHBOARD_ROUTE) {
        Role::Lp
    } else {
        return RouteDecision::Redirect(AUTH_ROUTE.to_string());
    };

    let Some(profile) = profile else {
        return RouteDecision::Redirect(AUTH_ROUTE.to_string());
    };
    if profile.role == Role::Lp && !profile.is_approved {
        return RouteDecision::PendingApproval;
    }
    if profile.role != area {
        return RouteDecision::Redirect(landing_route(profile).to_string());
    }
    RouteDecision::Render
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_respects_segments() {
        assert!(under("/admin", "/admin"));
        assert!(under("/admin/links", "/admin"));
        assert!(!under("/administrator", "/admin"));
    }
}
