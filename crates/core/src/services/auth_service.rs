use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::query::Query;
use crate::backend::traits::{IdentityProvider, TableStore};
use crate::backend::{from_row, tables};
use crate::errors::CoreError;
use crate::models::profile::{Profile, Role, SignUpAttributes};
use crate::models::record::Row;

/// Message the identity provider returns for a bad email/password pair.
const INVALID_CREDENTIALS: &str = "Invalid login credentials";

/// Sign-in, registration and sign-out against the identity provider plus
/// the `profiles` table.
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn TableStore>,
    admin_code: String,
}

impl AuthService {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn TableStore>, admin_code: impl Into<String>) -> Self {
        Self {
            identity,
            store,
            admin_code: admin_code.into(),
        }
    }

    /// `true` when `code` unlocks admin registration.
    #[must_use]
    pub fn check_admin_code(&self, code: &str) -> bool {
        code == self.admin_code
    }

    /// Authenticate and load the caller's profile.
    ///
    /// A wrong email/password pair becomes
    /// [`CoreError::InvalidCredentials`]; other provider errors are passed
    /// through verbatim.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Profile, CoreError> {
        let user = self
            .identity
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| match e {
                CoreError::Auth(msg) if msg == INVALID_CREDENTIALS => CoreError::InvalidCredentials,
                other => other,
            })
            .inspect_err(|e| warn!("Sign-in failed for {email}: {e}"))?;

        let rows = self
            .store
            .select(tables::PROFILES, &Query::all().eq("id", user.id.as_str()))
            .await?;
        let Some(row) = rows.into_iter().next() else {
            error!("No profile row for user {}", user.id);
            return Err(CoreError::ProfileNotFound(user.id));
        };
        let profile: Profile = from_row(row)?;
        info!("Signed in {} as {}", profile.email, profile.role);
        Ok(profile)
    }

    /// Register an account and its profile row.
    ///
    /// Admin registrations need the verification code and are approved
    /// immediately; LP registrations start unapproved.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &SignUpAttributes,
        admin_code: Option<&str>,
    ) -> Result<(), CoreError> {
        if attributes.role == Role::Admin && !admin_code.is_some_and(|c| self.check_admin_code(c)) {
            return Err(CoreError::InvalidAdminCode);
        }
        let is_approved = attributes.role == Role::Admin;

        let metadata = to_object(json!({
            "full_name": attributes.full_name,
            "company_name": attributes.company_name,
            "role": attributes.role,
            "is_approved": is_approved,
        }));
        let user = self.identity.sign_up(email, password, metadata).await?;

        let profile = to_object(json!({
            "id": user.id,
            "email": email,
            "full_name": attributes.full_name,
            "company_name": attributes.company_name,
            "role": attributes.role,
            "is_approved": is_approved,
        }));
        self.store
            .insert(tables::PROFILES, vec![profile])
            .await
            .inspect_err(|e| error!("Error creating profile for {email}: {e}"))?;
        info!("Registered {email} as {}", attributes.role);
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), CoreError> {
        self.identity.sign_out().await
    }
}

fn to_object(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}
