use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::backend::query::{Filter, Query};
use crate::backend::traits::TableStore;
use crate::backend::{from_row, tables};
use crate::errors::CoreError;
use crate::models::company::{CompanySort, CompanySummary, SortDirection};
use crate::models::metric::Metric;
use crate::models::profile::{ApprovalStatus, Profile, Role};
use crate::models::quarter::QuarterRef;
use crate::models::record::{QuarterlyRecord, Row};

use super::retry::RetryPolicy;

/// Administrative reads and mutations behind the admin dashboard.
///
/// Every backend call goes through the [`RetryPolicy`]; the final error is
/// returned to the caller after the last attempt.
pub struct AdminService {
    store: Arc<dyn TableStore>,
    retry: RetryPolicy,
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}

impl AdminService {
    pub fn new(store: Arc<dyn TableStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    async fn select(&self, operation: &str, table: &'static str, query: Query) -> Result<Vec<Row>, CoreError> {
        self.retry
            .run(operation, || {
                let store = Arc::clone(&self.store);
                let query = query.clone();
                async move { store.select(table, &query).await }
            })
            .await
    }

    async fn update(&self, operation: &str, table: &'static str, filter: Filter, patch: Row) -> Result<Vec<Row>, CoreError> {
        self.retry
            .run(operation, || {
                let store = Arc::clone(&self.store);
                let filter = filter.clone();
                let patch = patch.clone();
                async move { store.update(table, &filter, patch).await }
            })
            .await
    }

    // ── Investors ───────────────────────────────────────────────────

    /// LP profiles, newest registration first.
    pub async fn list_investors(&self) -> Result<Vec<Profile>, CoreError> {
        let rows = self
            .select(
                "fetch investors",
                tables::PROFILES,
                Query::all()
                    .eq("role", Role::Lp.to_string())
                    .order_by("created_at", false),
            )
            .await
            .inspect_err(|e| error!("Error fetching users: {e}"))?;
        rows.into_iter().map(from_row).collect()
    }

    /// Approve an LP, or move them back to pending.
    pub async fn set_approval(&self, user_id: &str, approve: bool) -> Result<(), CoreError> {
        let status = if approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        };
        let patch = object(json!({
            "is_approved": approve,
            "status": status.to_string(),
            "updated_at": Utc::now().to_rfc3339(),
        }));
        self.update_profile("update approval", user_id, patch)
            .await
            .inspect_err(|e| error!("Error updating user approval: {e}"))?;
        info!("User {user_id} is now {status}");
        Ok(())
    }

    /// Reject an LP registration and drop any company assignment.
    pub async fn reject(&self, user_id: &str) -> Result<(), CoreError> {
        let patch = object(json!({
            "is_approved": false,
            "status": ApprovalStatus::Rejected.to_string(),
            "assigned_company_id": Value::Null,
            "updated_at": Utc::now().to_rfc3339(),
        }));
        self.update_profile("reject user", user_id, patch)
            .await
            .inspect_err(|e| error!("Error rejecting user: {e}"))?;
        info!("User {user_id} rejected");
        Ok(())
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), CoreError> {
        let filter = Filter::eq("id", user_id);
        self.retry
            .run("delete user", || {
                let store = Arc::clone(&self.store);
                let filter = filter.clone();
                async move { store.delete(tables::PROFILES, &filter).await }
            })
            .await
            .inspect_err(|e| error!("Error deleting user: {e}"))?;
        info!("User {user_id} deleted");
        Ok(())
    }

    /// Link an investor to a `company_data` row. An empty id clears it.
    pub async fn assign_company(&self, user_id: &str, company_id: &str) -> Result<(), CoreError> {
        let company = if company_id.trim().is_empty() {
            Value::Null
        } else {
            Value::String(company_id.to_string())
        };
        let patch = object(json!({
            "assigned_company_id": company,
            "updated_at": Utc::now().to_rfc3339(),
        }));
        self.update_profile("assign company", user_id, patch)
            .await
            .inspect_err(|e| error!("Error assigning company: {e}"))?;
        Ok(())
    }

    async fn update_profile(&self, operation: &str, user_id: &str, patch: Row) -> Result<(), CoreError> {
        let updated = self
            .update(operation, tables::PROFILES, Filter::eq("id", user_id), patch)
            .await?;
        if updated.is_empty() {
            return Err(CoreError::ProfileNotFound(user_id.to_string()));
        }
        Ok(())
    }

    /// User id to assigned company id, for every profile.
    pub async fn company_assignments(&self) -> Result<HashMap<String, Option<String>>, CoreError> {
        let rows = self
            .select(
                "fetch company assignments",
                tables::PROFILES,
                Query::all().columns(&["id", "assigned_company_id"]),
            )
            .await
            .inspect_err(|e| error!("Error fetching company assignments: {e}"))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let record = QuarterlyRecord::from_row(row);
                let id = record.id()?;
                let company = record.text("assigned_company_id").map(str::to_string);
                Some((id, company))
            })
            .collect())
    }

    // ── Companies ───────────────────────────────────────────────────

    pub async fn list_companies(&self, sort: CompanySort) -> Result<Vec<CompanySummary>, CoreError> {
        let rows = self
            .select(
                "fetch companies",
                tables::COMPANY_DATA,
                Query::all()
                    .columns(&["id", "company_no", "company_name", "total_commitment"])
                    .order_by(sort.field.column(), sort.direction == SortDirection::Asc),
            )
            .await
            .inspect_err(|e| error!("Error fetching company data: {e}"))?;
        rows.into_iter().map(from_row).collect()
    }

    // ── Fund level ──────────────────────────────────────────────────

    /// The fund-level row, inserting an empty one when none exists yet.
    pub async fn fund_level_or_create(&self) -> Result<QuarterlyRecord, CoreError> {
        let fetched = self
            .retry
            .run("fetch fund level", || {
                let store = Arc::clone(&self.store);
                async move { store.select_single(tables::FUND_LEVEL, &Query::all()).await }
            })
            .await;

        match fetched {
            Ok(row) => Ok(QuarterlyRecord::from_row(row)),
            Err(e) if e.is_not_found() => {
                debug!("No fund level row, creating one");
                let inserted = self
                    .retry
                    .run("create fund level", || {
                        let store = Arc::clone(&self.store);
                        async move { store.insert(tables::FUND_LEVEL, vec![Row::new()]).await }
                    })
                    .await
                    .inspect_err(|e| error!("Error creating fund level data: {e}"))?;
                inserted
                    .into_iter()
                    .next()
                    .map(QuarterlyRecord::from_row)
                    .ok_or_else(|| CoreError::Store {
                        table: tables::FUND_LEVEL.to_string(),
                        message: "insert returned no row".into(),
                    })
            }
            Err(e) => {
                error!("Error fetching fund level data: {e}");
                Err(e)
            }
        }
    }

    /// Write one fund-level metric cell; `None` clears it.
    pub async fn update_fund_metric(
        &self,
        fund_id: &str,
        metric: Metric,
        q: QuarterRef,
        value: Option<f64>,
    ) -> Result<QuarterlyRecord, CoreError> {
        let mut cell = QuarterlyRecord::new();
        cell.set_metric(metric, q, value);
        let updated = self
            .update("update fund level", tables::FUND_LEVEL, Filter::eq("id", fund_id), cell.fields)
            .await
            .inspect_err(|e| error!("Error updating fund level data: {e}"))?;
        updated
            .into_iter()
            .next()
            .map(QuarterlyRecord::from_row)
            .ok_or_else(|| CoreError::NotFound(format!("fund level row {fund_id}")))
    }
}
