use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::query::Query;
use crate::backend::tables;
use crate::backend::traits::TableStore;
use crate::errors::CoreError;
use crate::models::metric::{ACCOUNT_METRICS, PORTFOLIO_METRICS};
use crate::models::quarter::QuarterCatalog;
use crate::models::record::QuarterlyRecord;
use crate::models::settings::{ViewSettings, ViewSettingsPatch, VIEW_SETTINGS_KEY};

use super::availability_service::AvailabilityService;

/// Number of quarters pre-selected in the account comparison table.
pub const ACCOUNT_QUARTER_COUNT: usize = 4;

/// Persists the dashboard quarter selections in the `user_preferences`
/// table under a single key.
///
/// Constructed once per session and handed to every consumer; there is no
/// ambient global copy. Reads and writes never fail from the caller's point
/// of view: any backend error is logged and the hard-coded
/// [`ViewSettings::default`] is returned instead, so a broken settings
/// fetch never blocks the dashboard.
pub struct ViewSettingsService {
    store: Arc<dyn TableStore>,
    portfolio_resolver: AvailabilityService,
    account_resolver: AvailabilityService,
    today: Option<NaiveDate>,
}

impl ViewSettingsService {
    pub fn new(store: Arc<dyn TableStore>, catalog: QuarterCatalog) -> Self {
        Self {
            store,
            portfolio_resolver: AvailabilityService::with_metrics(catalog, &PORTFOLIO_METRICS),
            account_resolver: AvailabilityService::with_metrics(catalog, &ACCOUNT_METRICS),
            today: None,
        }
    }

    /// Pin the date used for the no-data fallback sequence.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    /// Current settings, seeding or refreshing the stored copy from the
    /// latest data first.
    ///
    /// - No stored settings: defaults are derived from the data and saved.
    /// - Stored settings: the portfolio quarter moves forward when newer
    ///   data exists, and the account quarters are replaced whenever they
    ///   differ from the latest four with data. Nothing is written when
    ///   both already match.
    pub async fn get(&self) -> ViewSettings {
        match self.try_get().await {
            Ok(settings) => settings,
            Err(e) => {
                error!("Error fetching view settings: {e}");
                ViewSettings::default()
            }
        }
    }

    /// Shallow-merge `patch` into the current settings and write the result
    /// back in full. Last writer wins.
    ///
    /// Returns the merged settings, also when the write failed.
    pub async fn update(&self, patch: &ViewSettingsPatch) -> ViewSettings {
        let current = self.get().await;
        let updated = current.merged(patch);
        if let Err(e) = self.write(&updated).await {
            error!("Error updating view settings: {e}");
        }
        updated
    }

    async fn try_get(&self) -> Result<ViewSettings, CoreError> {
        let stored = self
            .store
            .select_maybe_single(
                tables::USER_PREFERENCES,
                &Query::all().columns(&["value"]).eq("key", VIEW_SETTINGS_KEY),
            )
            .await?;

        let (latest_quarter, latest_quarters) = self.latest_from_data().await;

        let current = match stored.and_then(|row| row.get("value").cloned()) {
            Some(Value::Null) | None => None,
            Some(value) => match serde_json::from_value::<ViewSettings>(value) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    warn!("Stored view settings are malformed, reseeding: {e}");
                    None
                }
            },
        };

        let Some(mut settings) = current else {
            let seeded = ViewSettings {
                portfolio_quarter: latest_quarter,
                account_quarters: latest_quarters,
            };
            info!(
                "Seeding view settings: portfolio {}, accounts {:?}",
                seeded.portfolio_quarter, seeded.account_quarters
            );
            self.write(&seeded).await?;
            return Ok(seeded);
        };

        let mut needs_update = false;
        if latest_quarter > settings.portfolio_quarter {
            debug!(
                "Portfolio quarter {} superseded by {}",
                settings.portfolio_quarter, latest_quarter
            );
            settings.portfolio_quarter = latest_quarter;
            needs_update = true;
        }
        if settings.account_quarters != latest_quarters {
            debug!(
                "Account quarters {:?} replaced by {:?}",
                settings.account_quarters, latest_quarters
            );
            settings.account_quarters = latest_quarters;
            needs_update = true;
        }

        if needs_update {
            self.write(&settings).await?;
        }
        Ok(settings)
    }

    /// Latest portfolio quarter and latest account quarters. A failed data
    /// read counts as "no data".
    async fn latest_from_data(&self) -> (crate::models::quarter::QuarterRef, Vec<String>) {
        let portfolio = self.load_records(tables::PORTFOLIO_DATA).await;
        let accounts = self.load_records(tables::COMPANY_DATA).await;
        (
            self.portfolio_resolver.latest_quarter(&portfolio),
            self.account_resolver
                .latest_n_quarters(&accounts, ACCOUNT_QUARTER_COUNT, self.today()),
        )
    }

    async fn load_records(&self, table: &str) -> Vec<QuarterlyRecord> {
        match self.store.select(table, &Query::all()).await {
            Ok(rows) => rows.into_iter().map(QuarterlyRecord::from_row).collect(),
            Err(e) => {
                warn!("Error reading {table} for view settings: {e}");
                Vec::new()
            }
        }
    }

    async fn write(&self, settings: &ViewSettings) -> Result<(), CoreError> {
        let value = serde_json::to_value(settings)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize view settings: {e}")))?;
        let row = json!({ "key": VIEW_SETTINGS_KEY, "value": value });
        let Value::Object(row) = row else {
            return Err(CoreError::Serialization("view settings row is not an object".into()));
        };
        self.store
            .upsert(tables::USER_PREFERENCES, vec![row], "key")
            .await?;
        Ok(())
    }
}
