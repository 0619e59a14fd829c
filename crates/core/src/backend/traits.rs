use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::record::Row;

use super::query::{Filter, Query};

/// Generic tabular store behind the portal (the hosted Postgres REST API in
/// production, [`MemoryBackend`](super::memory::MemoryBackend) offline and
/// in tests). Services only ever talk to this trait.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait TableStore: Send + Sync {
    /// Human-readable name of this backend (for logs/errors).
    fn name(&self) -> &str;

    /// Rows of `table` matching `query`.
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, CoreError>;

    /// Insert rows; returns them as stored (ids filled in).
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, CoreError>;

    /// Apply `patch` to every row matching `filter`; returns the updated rows.
    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> Result<Vec<Row>, CoreError>;

    /// Insert rows, or merge them into existing rows sharing `on_conflict`.
    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Row>,
        on_conflict: &str,
    ) -> Result<Vec<Row>, CoreError>;

    /// Delete every row matching `filter`.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), CoreError>;

    /// Exactly one row. Zero rows is [`CoreError::NotFound`]; more than one
    /// is a store error.
    async fn select_single(&self, table: &str, query: &Query) -> Result<Row, CoreError> {
        let mut rows = self.select(table, query).await?;
        match rows.len() {
            0 => Err(CoreError::NotFound(format!("no row in '{table}'"))),
            1 => Ok(rows.remove(0)),
            n => Err(CoreError::Store {
                table: table.to_string(),
                message: format!("expected a single row, got {n}"),
            }),
        }
    }

    /// At most one row.
    async fn select_maybe_single(&self, table: &str, query: &Query) -> Result<Option<Row>, CoreError> {
        match self.select_single(table, query).await {
            Ok(row) => Ok(Some(row)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// The authenticated account returned by an [`IdentityProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Email/password identity service.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait IdentityProvider: Send + Sync {
    /// Errors carry the provider's message verbatim in [`CoreError::Auth`].
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthUser, CoreError>;

    /// Register an account; `metadata` is stored alongside it.
    async fn sign_up(&self, email: &str, password: &str, metadata: Row) -> Result<AuthUser, CoreError>;

    async fn sign_out(&self) -> Result<(), CoreError>;
}
