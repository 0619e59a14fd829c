use std::sync::Arc;
use tracing::{debug, error};

use crate::backend::query::Query;
use crate::backend::tables;
use crate::backend::traits::TableStore;
use crate::errors::CoreError;
use crate::formatting::{format_metric, Surface};
use crate::models::dashboard::{
    AccountComparison, AccountRow, CapitalPoint, MetricCard, PerformancePoint, PortfolioRow,
    QuarterSnapshot,
};
use crate::models::metric::{Metric, ACCOUNT_METRICS, FUND_METRICS};
use crate::models::profile::Profile;
use crate::models::quarter::{QuarterCatalog, QuarterRef};
use crate::models::record::QuarterlyRecord;

use super::availability_service::{records_of, AvailabilityService};

/// Read side of both dashboards.
///
/// Fetches never retry: a failure is logged and read as "no data" so the
/// page still renders. Everything past the fetch is a pure projection of
/// already-loaded records.
pub struct DashboardService {
    store: Arc<dyn TableStore>,
    catalog: QuarterCatalog,
}

impl DashboardService {
    pub fn new(store: Arc<dyn TableStore>, catalog: QuarterCatalog) -> Self {
        Self { store, catalog }
    }

    // ── Fetches ─────────────────────────────────────────────────────

    /// The single fund-level row. Absent (no row entered yet) and failed
    /// reads both come back as `None`.
    pub async fn fund_level(&self) -> Option<QuarterlyRecord> {
        match self.store.select_single(tables::FUND_LEVEL, &Query::all()).await {
            Ok(row) => Some(QuarterlyRecord::from_row(row)),
            Err(e) if e.is_not_found() => {
                debug!("No fund level row yet");
                None
            }
            Err(e) => {
                error!("Error fetching fund level data: {e}");
                None
            }
        }
    }

    /// The investor's `company_data` row. Uses the profile's assigned
    /// company when set, otherwise the single row the backend lets this
    /// user see.
    pub async fn company_for(&self, profile: &Profile) -> Option<QuarterlyRecord> {
        let query = match profile.assigned_company_id.as_deref() {
            Some(id) if !id.is_empty() => Query::all().eq("id", id),
            _ => Query::all(),
        };
        match self.store.select_single(tables::COMPANY_DATA, &query).await {
            Ok(row) => Some(QuarterlyRecord::from_row(row)),
            Err(e) if e.is_not_found() => {
                debug!("No company data for {}", profile.email);
                None
            }
            Err(e) => {
                error!("Error fetching investor data: {e}");
                None
            }
        }
    }

    /// Every portfolio company row, empty on failure.
    pub async fn portfolio_data(&self) -> Vec<QuarterlyRecord> {
        match self.store.select(tables::PORTFOLIO_DATA, &Query::all()).await {
            Ok(rows) => rows.into_iter().map(QuarterlyRecord::from_row).collect(),
            Err(e) => {
                error!("Error fetching portfolio data: {e}");
                Vec::new()
            }
        }
    }

    // ── Projections ─────────────────────────────────────────────────

    /// Paid capital and NAV for `q`; `None` when both are zero or absent.
    #[must_use]
    pub fn quarter_snapshot(record: Option<&QuarterlyRecord>, q: QuarterRef) -> Option<QuarterSnapshot> {
        let record = record?;
        let paid_capital = record.metric_or_zero(Metric::PaidCapital, q);
        let nav = record.metric_or_zero(Metric::Nav, q);
        if paid_capital == 0.0 && nav == 0.0 {
            return None;
        }
        Some(QuarterSnapshot {
            quarter: q,
            paid_capital,
            nav,
            difference: nav - paid_capital,
        })
    }

    /// Snapshot of the newest quarter holding account data.
    #[must_use]
    pub fn latest_snapshot(&self, record: Option<&QuarterlyRecord>) -> Option<QuarterSnapshot> {
        let resolver = AvailabilityService::with_metrics(self.catalog, &[Metric::PaidCapital, Metric::Nav]);
        let latest = resolver.available(records_of(record)).into_iter().next()?;
        Self::quarter_snapshot(record, latest)
    }

    /// Paid capital vs NAV, oldest quarter first, skipping empty quarters.
    #[must_use]
    pub fn capital_series(&self, record: Option<&QuarterlyRecord>) -> Vec<CapitalPoint> {
        let Some(record) = record else {
            return Vec::new();
        };
        self.ascending()
            .filter_map(|q| {
                let paid_capital = record.metric_or_zero(Metric::PaidCapital, q);
                let nav = record.metric_or_zero(Metric::Nav, q);
                (paid_capital > 0.0 || nav > 0.0).then(|| CapitalPoint {
                    label: q.label(),
                    paid_capital,
                    nav,
                })
            })
            .collect()
    }

    /// Fund TVPI and IRR (in percent), oldest quarter first.
    #[must_use]
    pub fn performance_series(&self, record: Option<&QuarterlyRecord>) -> Vec<PerformancePoint> {
        let Some(record) = record else {
            return Vec::new();
        };
        self.ascending()
            .filter_map(|q| {
                let tvpi = record.metric_or_zero(Metric::Tvpi, q);
                let irr = record.metric_or_zero(Metric::Irr, q);
                (tvpi > 0.0 || irr > 0.0).then(|| PerformancePoint {
                    label: q.label(),
                    tvpi,
                    irr: irr * 100.0,
                })
            })
            .collect()
    }

    fn ascending(&self) -> impl Iterator<Item = QuarterRef> {
        self.catalog.candidates_desc().into_iter().rev()
    }

    /// Fund summary cards for `q`, in display order.
    #[must_use]
    pub fn fund_cards(record: Option<&QuarterlyRecord>, q: QuarterRef, surface: Surface) -> Vec<MetricCard> {
        FUND_METRICS
            .iter()
            .map(|&metric| MetricCard {
                metric,
                label: metric.label().to_string(),
                display: format_metric(metric, record.and_then(|r| r.metric(metric, q)), surface),
            })
            .collect()
    }

    /// Portfolio table for `q`, one row per company.
    #[must_use]
    pub fn portfolio_rows(records: &[QuarterlyRecord], q: QuarterRef) -> Vec<PortfolioRow> {
        records
            .iter()
            .map(|company| {
                let total_investment = company.metric_or_zero(Metric::TotalInvestment, q);
                let total_value = company.metric_or_zero(Metric::TotalValue, q);
                let multiple = if total_investment == 0.0 {
                    0.0
                } else {
                    total_value / total_investment
                };
                PortfolioRow {
                    company_name: company
                        .text("portfolio_company_name")
                        .unwrap_or_default()
                        .to_string(),
                    total_investment,
                    total_value,
                    multiple,
                    latest_ownership: company.number("latest_ownership"),
                    latest_valuation: company.number("latest_valuation"),
                }
            })
            .collect()
    }

    /// Account table for the selected quarter tokens. Only quarters that
    /// hold account data are shown, oldest first; cells use the investor
    /// currency style.
    #[must_use]
    pub fn account_comparison(&self, record: Option<&QuarterlyRecord>, selected: &[String]) -> AccountComparison {
        let resolver = AvailabilityService::with_metrics(self.catalog, &ACCOUNT_METRICS);
        let mut quarters: Vec<QuarterRef> = resolver
            .available(records_of(record))
            .into_iter()
            .filter(|q| selected.contains(&q.token()))
            .collect();
        quarters.sort();

        let rows = ACCOUNT_METRICS
            .iter()
            .map(|&metric| AccountRow {
                metric,
                label: metric.label().to_string(),
                cells: quarters
                    .iter()
                    .map(|&q| format_metric(metric, record.and_then(|r| r.metric(metric, q)), Surface::Investor))
                    .collect(),
            })
            .collect();

        AccountComparison { quarters, rows }
    }
}

/// Flip `token` in the selection: removed when present, appended otherwise.
pub fn toggle_account_quarter(selected: &[String], token: &str) -> Result<Vec<String>, CoreError> {
    QuarterRef::parse_token(token)?;
    if selected.iter().any(|t| t == token) {
        Ok(selected.iter().filter(|t| *t != token).cloned().collect())
    } else {
        let mut updated = selected.to_vec();
        updated.push(token.to_string());
        Ok(updated)
    }
}
