use thiserror::Error;

/// PostgREST code for "the result contains 0 rows" on a single-row fetch.
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Unified error type for the entire lp-portal-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Backend / Store ─────────────────────────────────────────────
    #[error("Store error ({table}): {message}")]
    Store {
        table: String,
        message: String,
    },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ── Identity ────────────────────────────────────────────────────
    #[error("{0}")]
    Auth(String),

    #[error("Incorrect email or password. Please try again.")]
    InvalidCredentials,

    #[error("Invalid admin verification code")]
    InvalidAdminCode,

    #[error("Profile not found for user {0}")]
    ProfileNotFound(String),

    #[error("Your account is pending approval. We will notify you via email once approved.")]
    PendingApproval,

    #[error("Access denied: {0}")]
    Forbidden(String),

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Link not found: {0}")]
    LinkNotFound(String),

    #[error("Invalid quarter: {0}")]
    InvalidQuarter(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// `true` for the expected "no such row yet" state, which callers
    /// handle by creating the row rather than reporting a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Strip query parameters: filters and grant types end up in the URL.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
