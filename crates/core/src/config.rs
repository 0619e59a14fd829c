use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::quarter::{QuarterCatalog, QuarterRef};
use crate::services::retry::RetryPolicy;

const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ADMIN_CODE: &str = "sert5656";

/// Runtime configuration of the portal core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Base URL of the hosted backend (REST and auth APIs live below it).
    pub backend_url: String,

    /// Public (anon) API key sent with every request.
    pub anon_key: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retry policy for administrative mutations.
    pub retry: RetryPolicy,

    /// Supported quarter span.
    pub catalog: QuarterCatalog,

    /// Verification code required to register an admin account.
    pub admin_signup_code: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            anon_key: String::new(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            catalog: QuarterCatalog::default(),
            admin_signup_code: DEFAULT_ADMIN_CODE.to_string(),
        }
    }
}

impl PortalConfig {
    /// Create config from environment variables.
    ///
    /// - `LP_PORTAL_URL`, `LP_PORTAL_ANON_KEY`
    /// - `LP_PORTAL_TIMEOUT_SECS`
    /// - `LP_PORTAL_ADMIN_CODE`
    /// - `LP_PORTAL_LAST_QUARTER` as a `"{year}-{quarter}"` token
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("LP_PORTAL_URL") {
            config.backend_url = url;
        }
        if let Ok(key) = std::env::var("LP_PORTAL_ANON_KEY") {
            config.anon_key = key;
        }
        if let Ok(secs) = std::env::var("LP_PORTAL_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.trim().parse().map_err(|_| {
                CoreError::Config(format!("LP_PORTAL_TIMEOUT_SECS must be an integer, got '{secs}'"))
            })?;
        }
        if let Ok(code) = std::env::var("LP_PORTAL_ADMIN_CODE") {
            config.admin_signup_code = code;
        }
        if let Ok(token) = std::env::var("LP_PORTAL_LAST_QUARTER") {
            let last = QuarterRef::parse_token(&token)
                .map_err(|e| CoreError::Config(format!("LP_PORTAL_LAST_QUARTER: {e}")))?;
            config.catalog =
                QuarterCatalog::new(config.catalog.first_year, last.year, last.quarter)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.backend_url.trim().is_empty() {
            return Err(CoreError::Config("backend URL must not be empty".into()));
        }
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err(CoreError::Config(format!(
                "backend URL must start with http:// or https://, got '{}'",
                self.backend_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config("request timeout must be greater than zero".into()));
        }
        if self.admin_signup_code.trim().is_empty() {
            return Err(CoreError::Config("admin sign-up code must not be empty".into()));
        }
        QuarterCatalog::new(
            self.catalog.first_year,
            self.catalog.last_year,
            self.catalog.last_year_max_quarter,
        )?;
        Ok(())
    }
}
