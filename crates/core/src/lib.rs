pub mod backend;
pub mod config;
pub mod errors;
pub mod formatting;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod routing;
pub mod services;

use std::sync::Arc;
use tracing::{error, info};

use backend::memory::MemoryBackend;
use backend::rest::RestBackend;
use backend::traits::{IdentityProvider, TableStore};
use config::PortalConfig;
use errors::CoreError;
use formatting::Surface;
use models::company::{CompanySort, CompanySummary};
use models::dashboard::{AdminOverview, LpOverview};
use models::link::{LinkPatch, NewLink, UsefulLink};
use models::metric::{Metric, ACCOUNT_METRICS, FUND_METRICS, PORTFOLIO_METRICS};
use models::profile::{Profile, Role, SignUpAttributes};
use models::quarter::QuarterRef;
use models::record::QuarterlyRecord;
use models::settings::{ViewSettings, ViewSettingsPatch};
use routing::RouteDecision;
use services::{
    admin_service::AdminService,
    auth_service::AuthService,
    availability_service::{records_of, AvailabilityService},
    dashboard_service::{toggle_account_quarter, DashboardService},
    link_service::LinkService,
    view_settings_service::ViewSettingsService,
};

/// Main entry point for the LP portal core library.
/// Holds the signed-in session and all services needed to drive both
/// dashboards.
#[must_use]
pub struct LpPortal {
    config: PortalConfig,
    store: Arc<dyn TableStore>,
    auth_service: AuthService,
    admin_service: AdminService,
    dashboard_service: DashboardService,
    settings_service: ViewSettingsService,
    link_service: LinkService,
    session: Option<Profile>,
    /// Last settings read or written during this session.
    view_settings: Option<ViewSettings>,
}

impl std::fmt::Debug for LpPortal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LpPortal")
            .field("backend", &self.store.name())
            .field("user", &self.session.as_ref().map(|p| &p.email))
            .field("links", &self.link_service.links().len())
            .field("view_settings", &self.view_settings)
            .finish()
    }
}

impl LpPortal {
    /// Build a portal over the given backends.
    pub fn new(
        config: PortalConfig,
        store: Arc<dyn TableStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            auth_service: AuthService::new(identity, Arc::clone(&store), config.admin_signup_code.clone()),
            admin_service: AdminService::new(Arc::clone(&store), config.retry),
            dashboard_service: DashboardService::new(Arc::clone(&store), config.catalog),
            settings_service: ViewSettingsService::new(Arc::clone(&store), config.catalog),
            link_service: LinkService::new(Arc::clone(&store), config.retry),
            store,
            config,
            session: None,
            view_settings: None,
        })
    }

    /// Connect to the hosted backend described by `config`.
    pub fn connect(config: PortalConfig) -> Result<Self, CoreError> {
        let backend = Arc::new(RestBackend::new(&config)?);
        info!("Connecting to {}", config.backend_url);
        Self::new(config, backend.clone(), backend)
    }

    /// Run against an in-process backend. The backend handle is returned
    /// so callers can seed it.
    pub fn in_memory(config: PortalConfig) -> Result<(Self, Arc<MemoryBackend>), CoreError> {
        let backend = Arc::new(MemoryBackend::new());
        let portal = Self::new(config, backend.clone(), backend.clone())?;
        Ok((portal, backend))
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    // ── Session ─────────────────────────────────────────────────────

    /// Sign in and remember the profile for this session.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<&Profile, CoreError> {
        let profile = self.auth_service.sign_in(email, password).await?;
        self.view_settings = None;
        Ok(&*self.session.insert(profile))
    }

    /// Register an account. Admins must pass the verification code.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &SignUpAttributes,
        admin_code: Option<&str>,
    ) -> Result<(), CoreError> {
        self.auth_service
            .sign_up(email, password, attributes, admin_code)
            .await
    }

    pub async fn sign_out(&mut self) -> Result<(), CoreError> {
        self.auth_service.sign_out().await?;
        self.session = None;
        self.view_settings = None;
        Ok(())
    }

    #[must_use]
    pub fn current_user(&self) -> Option<&Profile> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn check_admin_code(&self, code: &str) -> bool {
        self.auth_service.check_admin_code(code)
    }

    /// Route decision for `path` given the current session.
    #[must_use]
    pub fn route(&self, path: &str) -> RouteDecision {
        routing::resolve_route(path, self.session.as_ref())
    }

    fn require_admin(&self) -> Result<&Profile, CoreError> {
        match &self.session {
            None => Err(CoreError::Forbidden("not signed in".into())),
            Some(p) if p.role != Role::Admin => Err(CoreError::Forbidden("admin role required".into())),
            Some(p) => Ok(p),
        }
    }

    fn require_investor(&self) -> Result<&Profile, CoreError> {
        match &self.session {
            None => Err(CoreError::Forbidden("not signed in".into())),
            Some(p) if p.role != Role::Lp => Err(CoreError::Forbidden("investor role required".into())),
            Some(p) if !p.is_approved => Err(CoreError::PendingApproval),
            Some(p) => Ok(p),
        }
    }

    // ── View settings ───────────────────────────────────────────────

    /// Current quarter selections, refreshed from the latest data.
    pub async fn view_settings(&mut self) -> ViewSettings {
        let settings = self.settings_service.get().await;
        self.view_settings = Some(settings.clone());
        settings
    }

    /// Merge `patch` into the stored selections.
    pub async fn update_view_settings(&mut self, patch: &ViewSettingsPatch) -> ViewSettings {
        let settings = self.settings_service.update(patch).await;
        self.view_settings = Some(settings.clone());
        settings
    }

    /// Select the quarter shown by the portfolio table.
    pub async fn set_portfolio_quarter(&mut self, quarter: QuarterRef) -> ViewSettings {
        self.update_view_settings(&ViewSettingsPatch::portfolio_quarter(quarter))
            .await
    }

    /// Add or remove a quarter from the account comparison.
    pub async fn toggle_account_quarter(&mut self, token: &str) -> Result<Vec<String>, CoreError> {
        let current = match self.view_settings.clone() {
            Some(s) => s.account_quarters,
            None => self.view_settings().await.account_quarters,
        };
        let updated = toggle_account_quarter(&current, token)?;
        self.update_view_settings(&ViewSettingsPatch::account_quarters(updated.clone()))
            .await;
        Ok(updated)
    }

    // ── Dashboards ──────────────────────────────────────────────────

    /// Load the investor dashboard for the signed-in LP.
    pub async fn lp_overview(&mut self) -> Result<LpOverview, CoreError> {
        let profile = self.require_investor()?.clone();
        let catalog = self.config.catalog;

        let fund_level = self.dashboard_service.fund_level().await;
        let company = self.dashboard_service.company_for(&profile).await;
        let portfolio = self.dashboard_service.portfolio_data().await;
        let settings = self.view_settings().await;
        let links = self.links_or_empty().await;

        let fund_resolver = AvailabilityService::new(catalog);
        let fund_records = records_of(fund_level.as_ref());
        let fund_quarter = fund_resolver.latest_quarter(fund_records);
        let portfolio_resolver = AvailabilityService::with_metrics(catalog, &PORTFOLIO_METRICS);
        let account_resolver = AvailabilityService::with_metrics(catalog, &ACCOUNT_METRICS);

        Ok(LpOverview {
            latest: self.dashboard_service.latest_snapshot(company.as_ref()),
            capital_series: self.dashboard_service.capital_series(company.as_ref()),
            fund_quarter,
            fund_quarter_options: fund_resolver.quarter_options(fund_records, &[fund_quarter.token()]),
            fund_cards: DashboardService::fund_cards(fund_level.as_ref(), fund_quarter, Surface::Investor),
            performance_series: self.dashboard_service.performance_series(fund_level.as_ref()),
            portfolio_quarter: settings.portfolio_quarter,
            portfolio_quarter_options: portfolio_resolver
                .quarter_options(&portfolio, &[settings.portfolio_quarter.token()]),
            portfolio: DashboardService::portfolio_rows(&portfolio, settings.portfolio_quarter),
            account_quarter_options: account_resolver
                .quarter_options(records_of(company.as_ref()), &settings.account_quarters),
            accounts: self
                .dashboard_service
                .account_comparison(company.as_ref(), &settings.account_quarters),
            links,
            profile,
        })
    }

    /// Load the admin dashboard. Failures are surfaced after retries.
    pub async fn admin_overview(&mut self, sort: CompanySort) -> Result<AdminOverview, CoreError> {
        self.require_admin()?;
        let investors = self.admin_service.list_investors().await?;
        let companies = self.admin_service.list_companies(sort).await?;
        let assignments = self.admin_service.company_assignments().await?;
        let fund_level = self.admin_service.fund_level_or_create().await?;
        let links = self.links_or_empty().await;

        let resolver = AvailabilityService::new(self.config.catalog);
        let fund_quarter = resolver.latest_quarter(std::slice::from_ref(&fund_level));

        Ok(AdminOverview {
            fund_quarter_options: resolver.quarter_options(std::slice::from_ref(&fund_level), &[fund_quarter.token()]),
            fund_cards: DashboardService::fund_cards(Some(&fund_level), fund_quarter, Surface::Admin),
            investors,
            companies,
            assignments,
            fund_level,
            fund_quarter,
            links,
        })
    }

    // ── Administration ──────────────────────────────────────────────

    pub async fn list_investors(&self) -> Result<Vec<Profile>, CoreError> {
        self.require_admin()?;
        self.admin_service.list_investors().await
    }

    pub async fn set_investor_approval(&self, user_id: &str, approve: bool) -> Result<(), CoreError> {
        self.require_admin()?;
        self.admin_service.set_approval(user_id, approve).await
    }

    pub async fn reject_investor(&self, user_id: &str) -> Result<(), CoreError> {
        self.require_admin()?;
        self.admin_service.reject(user_id).await
    }

    pub async fn delete_investor(&self, user_id: &str) -> Result<(), CoreError> {
        self.require_admin()?;
        self.admin_service.delete_user(user_id).await
    }

    pub async fn assign_company(&self, user_id: &str, company_id: &str) -> Result<(), CoreError> {
        self.require_admin()?;
        self.admin_service.assign_company(user_id, company_id).await
    }

    pub async fn list_companies(&self, sort: CompanySort) -> Result<Vec<CompanySummary>, CoreError> {
        self.require_admin()?;
        self.admin_service.list_companies(sort).await
    }

    /// Write a fund-level metric for `quarter`. Only fund summary metrics
    /// are editable.
    pub async fn update_fund_metric(
        &self,
        metric: Metric,
        quarter: QuarterRef,
        value: Option<f64>,
    ) -> Result<QuarterlyRecord, CoreError> {
        self.require_admin()?;
        if !FUND_METRICS.contains(&metric) {
            return Err(CoreError::ValidationError(format!("{metric} is not a fund-level metric")));
        }
        if !self.config.catalog.contains(quarter) {
            return Err(CoreError::InvalidQuarter(format!("{quarter} is outside the supported range")));
        }
        let fund = self.admin_service.fund_level_or_create().await?;
        let id = fund
            .id()
            .ok_or_else(|| CoreError::NotFound("fund level row has no id".into()))?;
        self.admin_service
            .update_fund_metric(&id, metric, quarter, value)
            .await
    }

    // ── Useful links ────────────────────────────────────────────────

    #[must_use]
    pub fn links(&self) -> &[UsefulLink] {
        self.link_service.links()
    }

    pub async fn refresh_links(&mut self) -> Result<&[UsefulLink], CoreError> {
        self.link_service.fetch().await
    }

    async fn links_or_empty(&mut self) -> Vec<UsefulLink> {
        match self.link_service.fetch().await {
            Ok(links) => links.to_vec(),
            Err(e) => {
                error!("Failed to load useful links: {e}");
                Vec::new()
            }
        }
    }

    pub async fn add_link(&mut self, link: NewLink) -> Result<UsefulLink, CoreError> {
        self.require_admin()?;
        self.link_service.add(link).await
    }

    pub async fn update_link(&mut self, id: &str, patch: &LinkPatch) -> Result<UsefulLink, CoreError> {
        self.require_admin()?;
        self.link_service.update(id, patch).await
    }

    pub async fn delete_link(&mut self, id: &str) -> Result<(), CoreError> {
        self.require_admin()?;
        self.link_service.delete(id).await
    }

    pub async fn reorder_links(&mut self, moved_id: &str, target_id: &str) -> Result<(), CoreError> {
        self.require_admin()?;
        self.link_service.reorder(moved_id, target_id).await
    }
}
