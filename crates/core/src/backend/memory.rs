use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::record::Row;

use super::query::{Filter, Query};
use super::traits::{AuthUser, IdentityProvider, TableStore};

#[derive(Debug, Clone)]
struct Account {
    id: String,
    password: String,
    metadata: Row,
}

/// In-process backend implementing both [`TableStore`] and
/// [`IdentityProvider`].
///
/// - Rows are kept per table in insertion order.
/// - Inserts without an `id` get a fresh UUID.
/// - Upserts merge provided columns into the matching row (the
///   `merge-duplicates` behaviour of the hosted API).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to `table` as-is.
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut tables = lock(&self.tables);
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Snapshot of every row in `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.tables).get(table).map_or(0, Vec::len)
    }

    /// Metadata stored with an account at sign-up.
    #[must_use]
    pub fn account_metadata(&self, email: &str) -> Option<Row> {
        lock(&self.accounts)
            .get(&email.trim().to_lowercase())
            .map(|a| a.metadata.clone())
    }

    fn with_id(mut row: Row) -> Row {
        if matches!(row.get("id"), None | Some(Value::Null)) {
            row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        row
    }
}

/// The maps hold plain data, so a poisoned lock is still consistent.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TableStore for MemoryBackend {
    fn name(&self) -> &str {
        "Memory"
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, CoreError> {
        let tables = lock(&self.tables);
        Ok(tables
            .get(table)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, CoreError> {
        let mut tables = lock(&self.tables);
        let stored = tables.entry(table.to_string()).or_default();
        let inserted: Vec<Row> = rows.into_iter().map(Self::with_id).collect();
        stored.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> Result<Vec<Row>, CoreError> {
        let mut tables = lock(&self.tables);
        let Some(stored) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for row in stored.iter_mut().filter(|r| filter.matches(r)) {
            for (k, v) in &patch {
                row.insert(k.clone(), v.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Row>,
        on_conflict: &str,
    ) -> Result<Vec<Row>, CoreError> {
        let mut tables = lock(&self.tables);
        let stored = tables.entry(table.to_string()).or_default();
        let mut result = Vec::with_capacity(rows.len());

        for row in rows {
            let key = row.get(on_conflict).filter(|v| !v.is_null()).cloned();
            let existing = key.as_ref().and_then(|key| {
                let filter = Filter::eq(on_conflict, key.clone());
                stored.iter().position(|r| filter.matches(r))
            });
            match existing {
                Some(idx) => {
                    let target = &mut stored[idx];
                    for (k, v) in row {
                        target.insert(k, v);
                    }
                    result.push(target.clone());
                }
                None => {
                    let row = Self::with_id(row);
                    stored.push(row.clone());
                    result.push(row);
                }
            }
        }

        Ok(result)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), CoreError> {
        let mut tables = lock(&self.tables);
        if let Some(stored) = tables.get_mut(table) {
            stored.retain(|r| !filter.matches(r));
        }
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl IdentityProvider for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthUser, CoreError> {
        let accounts = lock(&self.accounts);
        let key = email.trim().to_lowercase();
        match accounts.get(&key) {
            Some(account) if account.password == password => Ok(AuthUser {
                id: account.id.clone(),
                email: key,
            }),
            _ => Err(CoreError::Auth("Invalid login credentials".into())),
        }
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Row) -> Result<AuthUser, CoreError> {
        let key = email.trim().to_lowercase();
        if key.is_empty() || !key.contains('@') {
            return Err(CoreError::Auth("Unable to validate email address: invalid format".into()));
        }
        if password.len() < 6 {
            return Err(CoreError::Auth("Password should be at least 6 characters.".into()));
        }
        let mut accounts = lock(&self.accounts);
        if accounts.contains_key(&key) {
            return Err(CoreError::Auth("User already registered".into()));
        }
        let id = Uuid::new_v4().to_string();
        accounts.insert(
            key.clone(),
            Account {
                id: id.clone(),
                password: password.to_string(),
                metadata,
            },
        );
        Ok(AuthUser { id, email: key })
    }

    async fn sign_out(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
