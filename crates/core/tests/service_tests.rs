// ═══════════════════════════════════════════════════════════════════
// Service Tests: AvailabilityService, ViewSettingsService, LinkService,
// AdminService, DashboardService, RetryPolicy
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lp_portal_core::backend::memory::MemoryBackend;
use lp_portal_core::backend::query::{Filter, Query};
use lp_portal_core::backend::tables;
use lp_portal_core::backend::traits::TableStore;
use lp_portal_core::errors::CoreError;
use lp_portal_core::formatting::Surface;
use lp_portal_core::models::company::{CompanySort, CompanySortField, SortDirection};
use lp_portal_core::models::link::{LinkPatch, NewLink, UsefulLink};
use lp_portal_core::models::metric::{Metric, ACCOUNT_METRICS, PORTFOLIO_METRICS};
use lp_portal_core::models::profile::ApprovalStatus;
use lp_portal_core::models::quarter::{QuarterCatalog, QuarterRef};
use lp_portal_core::models::record::{QuarterlyRecord, Row};
use lp_portal_core::models::settings::{ViewSettings, ViewSettingsPatch, VIEW_SETTINGS_KEY};
use lp_portal_core::services::admin_service::AdminService;
use lp_portal_core::services::availability_service::{records_of, AvailabilityService};
use lp_portal_core::services::dashboard_service::{toggle_account_quarter, DashboardService};
use lp_portal_core::services::link_service::{self, LinkService};
use lp_portal_core::services::retry::RetryPolicy;
use lp_portal_core::services::view_settings_service::ViewSettingsService;

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

fn q(year: i32, quarter: u8) -> QuarterRef {
    QuarterRef { year, quarter }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn record(value: Value) -> QuarterlyRecord {
    QuarterlyRecord::from_row(row(value))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn tokens(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════════
// Mock Stores
// ═══════════════════════════════════════════════════════════════════

/// Delegates to a `MemoryBackend`, failing the first N selects/upserts
/// (and every select on `broken_table`) while counting calls.
struct ScriptedStore {
    inner: MemoryBackend,
    select_failures: AtomicUsize,
    upsert_failures: AtomicUsize,
    selects: AtomicUsize,
    upserts: AtomicUsize,
    broken_table: Option<&'static str>,
}

impl ScriptedStore {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            select_failures: AtomicUsize::new(0),
            upsert_failures: AtomicUsize::new(0),
            selects: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            broken_table: None,
        }
    }

    fn broken(mut self, table: &'static str) -> Self {
        self.broken_table = Some(table);
        self
    }

    fn failing_selects(self, n: usize) -> Self {
        self.select_failures.store(n, Ordering::SeqCst);
        self
    }

    fn failing_upserts(self, n: usize) -> Self {
        self.upsert_failures.store(n, Ordering::SeqCst);
        self
    }

    fn select_calls(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TableStore for ScriptedStore {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, CoreError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.select_failures) {
            return Err(CoreError::Network("connection reset".into()));
        }
        if self.broken_table == Some(table) {
            return Err(down(table));
        }
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, CoreError> {
        self.inner.insert(table, rows).await
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> Result<Vec<Row>, CoreError> {
        self.inner.update(table, filter, patch).await
    }

    async fn upsert(&self, table: &str, rows: Vec<Row>, on_conflict: &str) -> Result<Vec<Row>, CoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.upsert_failures) {
            return Err(CoreError::Store {
                table: table.to_string(),
                message: "permission denied".into(),
            });
        }
        self.inner.upsert(table, rows, on_conflict).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), CoreError> {
        self.inner.delete(table, filter).await
    }
}

/// A store where every call fails (for testing degrade-to-default paths).
struct FailingStore;

fn down(table: &str) -> CoreError {
    CoreError::Store {
        table: table.to_string(),
        message: "service unavailable".into(),
    }
}

#[async_trait]
impl TableStore for FailingStore {
    fn name(&self) -> &str {
        "Failing"
    }

    async fn select(&self, table: &str, _query: &Query) -> Result<Vec<Row>, CoreError> {
        Err(down(table))
    }

    async fn insert(&self, table: &str, _rows: Vec<Row>) -> Result<Vec<Row>, CoreError> {
        Err(down(table))
    }

    async fn update(&self, table: &str, _filter: &Filter, _patch: Row) -> Result<Vec<Row>, CoreError> {
        Err(down(table))
    }

    async fn upsert(&self, table: &str, _rows: Vec<Row>, _on_conflict: &str) -> Result<Vec<Row>, CoreError> {
        Err(down(table))
    }

    async fn delete(&self, table: &str, _filter: &Filter) -> Result<(), CoreError> {
        Err(down(table))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Availability Service Tests
// ═══════════════════════════════════════════════════════════════════

fn resolver() -> AvailabilityService {
    AvailabilityService::new(QuarterCatalog::default())
}

#[test]
fn test_latest_quarter_scenario() {
    let fund = record(json!({
        "tvpi_q1_2024": 1.4,
        "irr_q1_2024": 0.082,
        "tvpi_q4_2023": 1.2,
    }));
    assert_eq!(resolver().latest_quarter(&[fund]), q(2024, 1));
}

#[test]
fn test_latest_quarter_falls_back_without_data() {
    assert_eq!(resolver().latest_quarter(&[]), q(2021, 1));
    assert_eq!(resolver().latest_quarter(records_of(None)), q(2021, 1));
    let zeros = record(json!({"tvpi_q1_2024": 0, "nav_q2_2023": null}));
    assert_eq!(resolver().latest_quarter(&[zeros]), q(2021, 1));
}

#[test]
fn test_available_quarters_descending_and_zero_free() {
    let fund = record(json!({
        "nav_q1_2023": 10.0,
        "tvpi_q3_2023": 1.1,
        "irr_q2_2023": 0,
        "opex_q4_2023": null,
    }));
    assert_eq!(resolver().available_quarters(&[fund], 2023), vec![3, 1]);
}

#[test]
fn test_available_quarters_union_across_records() {
    let a = record(json!({"total_value_q1_2024": 5.0}));
    let b = record(json!({"total_investment_q3_2024": 2.0, "total_value_q1_2024": 0}));
    let r = AvailabilityService::with_metrics(QuarterCatalog::default(), &PORTFOLIO_METRICS);
    assert_eq!(r.available_quarters(&[a, b], 2024), vec![3, 1]);
}

#[test]
fn test_available_quarters_outside_catalog_is_empty() {
    let fund = record(json!({"tvpi_q1_2019": 1.0, "tvpi_q3_2025": 1.0}));
    assert!(resolver().available_quarters(&[fund.clone()], 2019).is_empty());
    // Q3 2025 is past the supported range.
    assert!(resolver().available_quarters(&[fund], 2025).is_empty());
}

#[test]
fn test_untracked_metrics_do_not_count() {
    let company = record(json!({"tvpi_q2_2024": 1.3}));
    let r = AvailabilityService::with_metrics(QuarterCatalog::default(), &ACCOUNT_METRICS);
    assert!(r.available(&[company]).is_empty());
}

#[test]
fn test_latest_n_quarters_descending_without_duplicates() {
    let company = record(json!({
        "nav_q2_2024": 1.0,
        "paid_capital_q2_2024": 1.0,
        "nav_q1_2024": 1.0,
        "nav_q4_2023": 1.0,
        "management_fee_q3_2023": -5.0,
        "nav_q2_2023": 1.0,
    }));
    let result = resolver().latest_n_quarters(&[company], 4, date(2024, 7, 1));
    assert_eq!(result, tokens(&["2024-2", "2024-1", "2023-4", "2023-3"]));
}

#[test]
fn test_latest_n_quarters_returns_fewer_when_exhausted() {
    let company = record(json!({"nav_q1_2022": 1.0, "nav_q3_2021": 2.0}));
    let result = resolver().latest_n_quarters(&[company], 4, date(2024, 7, 1));
    assert_eq!(result, tokens(&["2022-1", "2021-3"]));
}

#[test]
fn test_latest_n_quarters_zero_n() {
    let company = record(json!({"nav_q1_2022": 1.0}));
    assert!(resolver().latest_n_quarters(&[company], 0, date(2024, 7, 1)).is_empty());
}

#[test]
fn test_latest_n_quarters_fallback_from_today() {
    let result = resolver().latest_n_quarters(&[], 4, date(2024, 5, 10));
    assert_eq!(result, tokens(&["2024-2", "2024-1", "2023-4", "2023-3"]));
}

#[test]
fn test_latest_n_quarters_fallback_clamps_future_dates() {
    let result = resolver().latest_n_quarters(&[], 4, date(2030, 11, 2));
    assert_eq!(result, tokens(&["2025-2", "2025-1", "2024-4", "2024-3"]));
}

#[test]
fn test_latest_n_quarters_fallback_stops_at_catalog_start() {
    let result = resolver().latest_n_quarters(&[], 4, date(2021, 2, 1));
    assert_eq!(result, tokens(&["2021-1"]));
    let early = resolver().latest_n_quarters(&[], 2, date(2018, 6, 1));
    assert_eq!(early, tokens(&["2021-1"]));
}

#[test]
fn test_availability_ignores_column_order() {
    let mut forward = Row::new();
    let mut backward = Row::new();
    let cells = [("nav_q1_2022", 1.0), ("tvpi_q4_2024", 2.0), ("irr_q2_2023", 0.1)];
    for (k, v) in cells {
        forward.insert(k.into(), json!(v));
    }
    for (k, v) in cells.iter().rev() {
        backward.insert(k.to_string(), json!(v));
    }
    let r = resolver();
    let a = r.latest_n_quarters(&[QuarterlyRecord::from_row(forward)], 3, date(2024, 1, 1));
    let b = r.latest_n_quarters(&[QuarterlyRecord::from_row(backward)], 3, date(2024, 1, 1));
    assert_eq!(a, b);
    assert_eq!(a, tokens(&["2024-4", "2023-2", "2022-1"]));
}

#[test]
fn test_quarter_options_flags_selection() {
    let company = record(json!({"nav_q1_2024": 1.0, "nav_q4_2023": 1.0}));
    let options = resolver().quarter_options(&[company], &tokens(&["2023-4", "2020-1"]));
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].label, "Q1 2024");
    assert_eq!(options[0].value, "2024-1");
    assert!(!options[0].selected);
    assert!(options[1].selected);
}

#[test]
fn test_custom_catalog_applies_everywhere() {
    let catalog = QuarterCatalog::new(2021, 2025, 1).unwrap();
    let r = AvailabilityService::new(catalog);
    let fund = record(json!({"tvpi_q2_2025": 1.5, "tvpi_q1_2025": 1.4}));
    assert_eq!(r.latest_quarter(&[fund]), q(2025, 1));
}

// ═══════════════════════════════════════════════════════════════════
// View Settings Service Tests
// ═══════════════════════════════════════════════════════════════════

fn seed_quarter_data(store: &MemoryBackend) {
    store.seed(
        tables::PORTFOLIO_DATA,
        vec![
            row(json!({"id": "p1", "portfolio_company_name": "Acme", "total_value_q3_2024": 10.0})),
            row(json!({"id": "p2", "portfolio_company_name": "Globex", "total_investment_q2_2024": 4.0})),
        ],
    );
    store.seed(
        tables::COMPANY_DATA,
        vec![row(json!({
            "id": "c1",
            "nav_q2_2024": 100.0,
            "nav_q1_2024": 90.0,
            "paid_capital_q4_2023": 80.0,
            "nav_q3_2023": 70.0,
            "nav_q2_2023": 60.0,
        }))],
    );
}

fn stored_settings(store: &MemoryBackend) -> Option<ViewSettings> {
    store
        .rows(tables::USER_PREFERENCES)
        .into_iter()
        .find(|r| r.get("key") == Some(&json!(VIEW_SETTINGS_KEY)))
        .and_then(|r| r.get("value").cloned())
        .and_then(|v| serde_json::from_value(v).ok())
}

fn seed_settings(store: &MemoryBackend, value: Value) {
    store.seed(
        tables::USER_PREFERENCES,
        vec![row(json!({"key": VIEW_SETTINGS_KEY, "value": value}))],
    );
}

#[tokio::test]
async fn test_settings_seeded_from_data_when_absent() {
    let store = Arc::new(MemoryBackend::new());
    seed_quarter_data(&store);
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let settings = service.get().await;

    assert_eq!(settings.portfolio_quarter, q(2024, 3));
    assert_eq!(settings.account_quarters, tokens(&["2024-2", "2024-1", "2023-4", "2023-3"]));
    assert_eq!(stored_settings(&store), Some(settings));
}

#[tokio::test]
async fn test_settings_get_is_idempotent() {
    let store = Arc::new(ScriptedStore::new());
    seed_quarter_data(&store.inner);
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let first = service.get().await;
    let second = service.get().await;

    assert_eq!(first, second);
    assert_eq!(store.upsert_calls(), 1, "only the seeding write is expected");
}

#[tokio::test]
async fn test_settings_advance_to_newer_portfolio_quarter() {
    let store = Arc::new(MemoryBackend::new());
    seed_quarter_data(&store);
    seed_settings(
        &store,
        json!({
            "portfolioQuarter": {"year": 2023, "quarter": 1},
            "accountQuarters": ["2024-2", "2024-1", "2023-4", "2023-3"],
        }),
    );
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let settings = service.get().await;

    assert_eq!(settings.portfolio_quarter, q(2024, 3));
    assert_eq!(stored_settings(&store).unwrap().portfolio_quarter, q(2024, 3));
}

#[tokio::test]
async fn test_settings_keep_portfolio_quarter_ahead_of_data() {
    let store = Arc::new(ScriptedStore::new());
    seed_quarter_data(&store.inner);
    seed_settings(
        &store.inner,
        json!({
            "portfolioQuarter": {"year": 2025, "quarter": 1},
            "accountQuarters": ["2024-2", "2024-1", "2023-4", "2023-3"],
        }),
    );
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let settings = service.get().await;

    assert_eq!(settings.portfolio_quarter, q(2025, 1));
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_settings_account_quarters_replaced_when_different() {
    let store = Arc::new(MemoryBackend::new());
    seed_quarter_data(&store);
    seed_settings(
        &store,
        json!({
            "portfolioQuarter": {"year": 2024, "quarter": 3},
            // Same set, different order: still a mismatch.
            "accountQuarters": ["2023-3", "2023-4", "2024-1", "2024-2"],
        }),
    );
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let settings = service.get().await;

    assert_eq!(settings.account_quarters, tokens(&["2024-2", "2024-1", "2023-4", "2023-3"]));
    assert_eq!(stored_settings(&store).unwrap(), settings);
}

#[tokio::test]
async fn test_settings_malformed_document_is_reseeded() {
    let store = Arc::new(MemoryBackend::new());
    seed_quarter_data(&store);
    seed_settings(&store, json!({"portfolio": "Q1"}));
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let settings = service.get().await;

    assert_eq!(settings.portfolio_quarter, q(2024, 3));
    assert_eq!(store.row_count(tables::USER_PREFERENCES), 1);
    assert_eq!(stored_settings(&store), Some(settings));
}

#[tokio::test]
async fn test_settings_without_any_data_use_fallbacks() {
    let store = Arc::new(MemoryBackend::new());
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default())
        .with_today(date(2024, 8, 15));

    let settings = service.get().await;

    assert_eq!(settings.portfolio_quarter, q(2021, 1));
    assert_eq!(settings.account_quarters, tokens(&["2024-3", "2024-2", "2024-1", "2023-4"]));
}

#[tokio::test]
async fn test_settings_failing_store_degrades_to_default() {
    let service = ViewSettingsService::new(Arc::new(FailingStore), QuarterCatalog::default());
    assert_eq!(service.get().await, ViewSettings::default());
    // Must not panic or propagate.
    let merged = service
        .update(&ViewSettingsPatch::portfolio_quarter(q(2023, 2)))
        .await;
    assert_eq!(merged.portfolio_quarter, q(2023, 2));
    assert_eq!(merged.account_quarters, ViewSettings::default().account_quarters);
}

#[tokio::test]
async fn test_settings_update_merges_and_writes_in_full() {
    let store = Arc::new(MemoryBackend::new());
    seed_quarter_data(&store);
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let written = service
        .update(&ViewSettingsPatch::portfolio_quarter(q(2023, 2)))
        .await;

    let stored = stored_settings(&store).unwrap();
    assert_eq!(stored.portfolio_quarter, q(2023, 2));
    assert_eq!(stored.account_quarters, tokens(&["2024-2", "2024-1", "2023-4", "2023-3"]));
    assert_eq!(written, stored);
}

#[tokio::test]
async fn test_settings_write_failure_after_seed_read_is_swallowed() {
    let store = Arc::new(ScriptedStore::new().failing_upserts(1));
    seed_quarter_data(&store.inner);
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    assert_eq!(service.get().await, ViewSettings::default());
    assert!(stored_settings(&store.inner).is_none());
}

#[tokio::test]
async fn test_settings_data_read_failure_counts_as_no_data() {
    let store = Arc::new(ScriptedStore::new().broken(tables::PORTFOLIO_DATA));
    seed_quarter_data(&store.inner);
    let service = ViewSettingsService::new(store.clone(), QuarterCatalog::default());

    let settings = service.get().await;

    assert_eq!(settings.portfolio_quarter, q(2021, 1));
    assert_eq!(settings.account_quarters, tokens(&["2024-2", "2024-1", "2023-4", "2023-3"]));
    assert_eq!(store.upsert_calls(), 1);
}

// ═══════════════════════════════════════════════════════════════════
// Reorder Engine Tests (pure)
// ═══════════════════════════════════════════════════════════════════

fn link(id: &str, order_index: u32) -> UsefulLink {
    UsefulLink {
        id: id.into(),
        title: format!("Link {id}"),
        url: format!("https://example.com/{id}"),
        description: None,
        order_index,
    }
}

fn ids(links: &[UsefulLink]) -> Vec<&str> {
    links.iter().map(|l| l.id.as_str()).collect()
}

#[test]
fn test_reorder_moves_down() {
    let links = vec![link("a", 0), link("b", 1), link("c", 2), link("d", 3)];
    let result = link_service::reorder(&links, "a", "c").unwrap();
    assert_eq!(ids(&result), vec!["b", "c", "a", "d"]);
}

#[test]
fn test_reorder_moves_up() {
    let links = vec![link("a", 0), link("b", 1), link("c", 2), link("d", 3)];
    let result = link_service::reorder(&links, "d", "b").unwrap();
    assert_eq!(ids(&result), vec!["a", "d", "b", "c"]);
}

#[test]
fn test_reorder_law_for_every_move() {
    let links = vec![link("a", 0), link("b", 1), link("c", 2), link("d", 3), link("e", 4)];
    for from in 0..links.len() {
        for to in 0..links.len() {
            let moved = links[from].id.clone();
            let result = link_service::reorder(&links, &moved, &links[to].id).unwrap();

            let indices: Vec<u32> = result.iter().map(|l| l.order_index).collect();
            assert_eq!(indices, (0..links.len() as u32).collect::<Vec<_>>());

            let mut before = ids(&links);
            let mut after = ids(&result);
            before.sort();
            after.sort();
            assert_eq!(before, after);

            assert_eq!(result[to].id, moved);
        }
    }
}

#[test]
fn test_reorder_unknown_id() {
    let links = vec![link("a", 0), link("b", 1)];
    assert!(matches!(
        link_service::reorder(&links, "zzz", "a"),
        Err(CoreError::LinkNotFound(id)) if id == "zzz"
    ));
    assert!(link_service::reorder(&links, "a", "zzz").is_err());
}

#[test]
fn test_renumber_repairs_gaps() {
    let mut links = vec![link("a", 0), link("c", 2), link("d", 7)];
    link_service::renumber(&mut links);
    let indices: Vec<u32> = links.iter().map(|l| l.order_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

// ═══════════════════════════════════════════════════════════════════
// Link Service Tests
// ═══════════════════════════════════════════════════════════════════

fn seed_links(store: &MemoryBackend) {
    let rows = ["a", "b", "c", "d"]
        .iter()
        .enumerate()
        .rev()
        .map(|(i, id)| row(serde_json::to_value(link(id, i as u32)).unwrap()))
        .collect();
    store.seed(tables::USEFUL_LINKS, rows);
}

fn stored_order(store: &MemoryBackend) -> Vec<(String, u64)> {
    let mut rows: Vec<(String, u64)> = store
        .rows(tables::USEFUL_LINKS)
        .into_iter()
        .map(|r| {
            (
                r["id"].as_str().unwrap().to_string(),
                r["order_index"].as_u64().unwrap(),
            )
        })
        .collect();
    rows.sort_by_key(|(_, i)| *i);
    rows
}

#[tokio::test]
async fn test_links_fetch_sorted_by_index() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let mut service = LinkService::new(store, RetryPolicy::none());

    let links = service.fetch().await.unwrap();
    assert_eq!(ids(links), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_links_add_appends_at_end() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    service.fetch().await.unwrap();

    let created = service
        .add(NewLink::new("Quarterly report", "https://example.com/q").with_description("PDF"))
        .await
        .unwrap();

    assert_eq!(created.order_index, 4);
    assert!(!created.id.is_empty());
    assert_eq!(created.description.as_deref(), Some("PDF"));
    assert_eq!(service.links().len(), 5);
    assert_eq!(store.row_count(tables::USEFUL_LINKS), 5);
}

#[tokio::test]
async fn test_links_add_before_fetch_continues_numbering() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let mut service = LinkService::new(store.clone(), RetryPolicy::none());

    let created = service
        .add(NewLink::new("Late addition", "https://example.com/late"))
        .await
        .unwrap();

    assert_eq!(created.order_index, 4);
    assert_eq!(ids(&service.links()[..4]), vec!["a", "b", "c", "d"]);
    let indices: Vec<u64> = stored_order(&store).into_iter().map(|(_, i)| i).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_links_mutations_before_fetch_find_stored_ids() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let patch = LinkPatch {
        title: Some("Renamed".into()),
        ..Default::default()
    };

    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    assert_eq!(service.update("c", &patch).await.unwrap().title, "Renamed");

    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    service.delete("a").await.unwrap();
    assert_eq!(ids(service.links()), vec!["b", "c", "d"]);

    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    service.reorder("d", "b").await.unwrap();
    assert_eq!(
        stored_order(&store),
        vec![("d".to_string(), 0), ("b".to_string(), 1), ("c".to_string(), 2)]
    );
}

#[tokio::test]
async fn test_links_add_rejects_blank_title() {
    let store = Arc::new(MemoryBackend::new());
    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    let result = service.add(NewLink::new("", "https://example.com")).await;
    assert!(matches!(result, Err(CoreError::ValidationError(_))));
    assert_eq!(store.row_count(tables::USEFUL_LINKS), 0);
}

#[tokio::test]
async fn test_links_update_changes_fields() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    service.fetch().await.unwrap();

    let patch = LinkPatch {
        title: Some("Renamed".into()),
        description: Some(Some("Now described".into())),
        ..Default::default()
    };
    let updated = service.update("b", &patch).await.unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.url, "https://example.com/b");
    assert_eq!(updated.order_index, 1);
    assert_eq!(service.links()[1].title, "Renamed");
}

#[tokio::test]
async fn test_links_update_unknown_id() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let mut service = LinkService::new(store, RetryPolicy::none());
    service.fetch().await.unwrap();
    let patch = LinkPatch {
        title: Some("x".into()),
        ..Default::default()
    };
    assert!(matches!(service.update("nope", &patch).await, Err(CoreError::LinkNotFound(_))));
}

#[tokio::test]
async fn test_links_delete_keeps_indices_dense() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    service.fetch().await.unwrap();

    service.delete("b").await.unwrap();

    assert_eq!(ids(service.links()), vec!["a", "c", "d"]);
    assert_eq!(
        stored_order(&store),
        vec![("a".into(), 0), ("c".into(), 1), ("d".into(), 2)]
    );
}

#[tokio::test]
async fn test_links_reorder_persists_full_order() {
    let store = Arc::new(MemoryBackend::new());
    seed_links(&store);
    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    service.fetch().await.unwrap();

    service.reorder("d", "a").await.unwrap();

    assert_eq!(ids(service.links()), vec!["d", "a", "b", "c"]);
    assert_eq!(
        stored_order(&store),
        vec![("d".into(), 0), ("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]
    );
    assert_eq!(store.row_count(tables::USEFUL_LINKS), 4);
}

#[tokio::test]
async fn test_links_reorder_failure_reloads_from_store() {
    let store = Arc::new(ScriptedStore::new().failing_upserts(1));
    seed_links(&store.inner);
    let mut service = LinkService::new(store.clone(), RetryPolicy::none());
    service.fetch().await.unwrap();

    let result = service.reorder("a", "d").await;

    assert!(matches!(result, Err(CoreError::Store { .. })));
    assert_eq!(ids(service.links()), vec!["a", "b", "c", "d"]);
}

// ═══════════════════════════════════════════════════════════════════
// Retry Policy Tests
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_retry_delays_double() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    assert_eq!(policy.delay_for(1), Duration::from_secs(2));
    assert_eq!(policy.delay_for(2), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_after_transient_failures() {
    let store = Arc::new(ScriptedStore::new().failing_selects(2));
    let service = AdminService::new(store.clone(), RetryPolicy::default());
    let start = tokio::time::Instant::now();

    let companies = service.list_companies(CompanySort::default()).await;

    assert!(companies.is_ok());
    assert_eq!(store.select_calls(), 3);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "waited {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "waited {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_retry_surfaces_final_error() {
    let store = Arc::new(ScriptedStore::new().failing_selects(usize::MAX));
    let service = AdminService::new(store.clone(), RetryPolicy::default());
    let start = tokio::time::Instant::now();

    let result = service.list_investors().await;

    assert!(matches!(result, Err(CoreError::Network(_))));
    assert_eq!(store.select_calls(), 4);
    assert!(start.elapsed() >= Duration::from_secs(7));
}

#[tokio::test]
async fn test_retry_skips_non_retryable_errors() {
    let calls = AtomicUsize::new(0);
    let result: Result<(), CoreError> = RetryPolicy::default()
        .run("lookup", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::NotFound("row".into())) }
        })
        .await;
    assert!(result.unwrap_err().is_not_found());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ═══════════════════════════════════════════════════════════════════
// Admin Service Tests
// ═══════════════════════════════════════════════════════════════════

fn seed_profiles(store: &MemoryBackend) {
    store.seed(
        tables::PROFILES,
        vec![
            row(json!({"id": "admin", "email": "admin@fund.com", "role": "admin", "is_approved": true,
                       "created_at": "2024-01-01T00:00:00+00:00"})),
            row(json!({"id": "lp-old", "email": "old@lp.com", "role": "lp", "is_approved": true,
                       "assigned_company_id": "c1", "created_at": "2024-02-01T00:00:00+00:00"})),
            row(json!({"id": "lp-new", "email": "new@lp.com", "role": "lp", "is_approved": false,
                       "created_at": "2024-06-01T00:00:00+00:00"})),
        ],
    );
}

fn profile_row(store: &MemoryBackend, id: &str) -> Row {
    store
        .rows(tables::PROFILES)
        .into_iter()
        .find(|r| r["id"] == json!(id))
        .unwrap()
}

#[tokio::test]
async fn test_admin_lists_investors_newest_first() {
    let store = Arc::new(MemoryBackend::new());
    seed_profiles(&store);
    let service = AdminService::new(store, RetryPolicy::none());

    let investors = service.list_investors().await.unwrap();
    let emails: Vec<&str> = investors.iter().map(|p| p.email.as_str()).collect();
    assert_eq!(emails, vec!["new@lp.com", "old@lp.com"]);
}

#[tokio::test]
async fn test_admin_approval_sets_flag_and_status() {
    let store = Arc::new(MemoryBackend::new());
    seed_profiles(&store);
    let service = AdminService::new(store.clone(), RetryPolicy::none());

    service.set_approval("lp-new", true).await.unwrap();
    let approved = profile_row(&store, "lp-new");
    assert_eq!(approved["is_approved"], json!(true));
    assert_eq!(approved["status"], json!("approved"));
    assert!(approved.contains_key("updated_at"));

    service.set_approval("lp-new", false).await.unwrap();
    assert_eq!(profile_row(&store, "lp-new")["status"], json!("pending"));
}

#[tokio::test]
async fn test_admin_reject_clears_assignment() {
    let store = Arc::new(MemoryBackend::new());
    seed_profiles(&store);
    let service = AdminService::new(store.clone(), RetryPolicy::none());

    service.reject("lp-old").await.unwrap();
    let rejected = profile_row(&store, "lp-old");
    assert_eq!(rejected["status"], json!(ApprovalStatus::Rejected.to_string()));
    assert_eq!(rejected["is_approved"], json!(false));
    assert_eq!(rejected["assigned_company_id"], Value::Null);
}

#[tokio::test]
async fn test_admin_unknown_profile() {
    let store = Arc::new(MemoryBackend::new());
    seed_profiles(&store);
    let service = AdminService::new(store, RetryPolicy::none());
    assert!(matches!(
        service.set_approval("ghost", true).await,
        Err(CoreError::ProfileNotFound(_))
    ));
}

#[tokio::test]
async fn test_admin_assign_and_clear_company() {
    let store = Arc::new(MemoryBackend::new());
    seed_profiles(&store);
    let service = AdminService::new(store.clone(), RetryPolicy::none());

    service.assign_company("lp-new", "c2").await.unwrap();
    let assignments = service.company_assignments().await.unwrap();
    assert_eq!(assignments.get("lp-new"), Some(&Some("c2".to_string())));
    assert_eq!(assignments.get("admin"), Some(&None));

    service.assign_company("lp-new", "").await.unwrap();
    assert_eq!(profile_row(&store, "lp-new")["assigned_company_id"], Value::Null);
}

#[tokio::test]
async fn test_admin_delete_user() {
    let store = Arc::new(MemoryBackend::new());
    seed_profiles(&store);
    let service = AdminService::new(store.clone(), RetryPolicy::none());
    service.delete_user("lp-old").await.unwrap();
    assert_eq!(store.row_count(tables::PROFILES), 2);
}

#[tokio::test]
async fn test_admin_list_companies_sorted() {
    let store = Arc::new(MemoryBackend::new());
    store.seed(
        tables::COMPANY_DATA,
        vec![
            row(json!({"id": "c1", "company_no": "002", "company_name": "Beta", "total_commitment": 500.0, "nav_q1_2024": 1.0})),
            row(json!({"id": "c2", "company_no": "001", "company_name": "Alpha", "total_commitment": 900.0})),
            row(json!({"id": "c3", "company_no": "003", "company_name": "Gamma", "total_commitment": 100.0})),
        ],
    );
    let service = AdminService::new(store, RetryPolicy::none());

    let by_no = service.list_companies(CompanySort::default()).await.unwrap();
    assert_eq!(by_no.iter().map(|c| c.company_no.as_str()).collect::<Vec<_>>(), vec!["001", "002", "003"]);

    let by_commitment = service
        .list_companies(CompanySort {
            field: CompanySortField::TotalCommitment,
            direction: SortDirection::Desc,
        })
        .await
        .unwrap();
    assert_eq!(by_commitment.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c2", "c1", "c3"]);
}

#[tokio::test]
async fn test_admin_fund_level_created_once() {
    let store = Arc::new(MemoryBackend::new());
    let service = AdminService::new(store.clone(), RetryPolicy::none());

    let created = service.fund_level_or_create().await.unwrap();
    assert!(created.id().is_some());
    let again = service.fund_level_or_create().await.unwrap();
    assert_eq!(created.id(), again.id());
    assert_eq!(store.row_count(tables::FUND_LEVEL), 1);
}

#[tokio::test]
async fn test_admin_update_fund_metric() {
    let store = Arc::new(MemoryBackend::new());
    let service = AdminService::new(store, RetryPolicy::none());
    let fund = service.fund_level_or_create().await.unwrap();
    let id = fund.id().unwrap();

    let updated = service
        .update_fund_metric(&id, Metric::Tvpi, q(2024, 1), Some(1.5))
        .await
        .unwrap();
    assert_eq!(updated.metric(Metric::Tvpi, q(2024, 1)), Some(1.5));

    let cleared = service
        .update_fund_metric(&id, Metric::Tvpi, q(2024, 1), None)
        .await
        .unwrap();
    assert_eq!(cleared.metric(Metric::Tvpi, q(2024, 1)), None);
}

// ═══════════════════════════════════════════════════════════════════
// Dashboard Service Tests
// ═══════════════════════════════════════════════════════════════════

fn dashboard(store: Arc<dyn TableStore>) -> DashboardService {
    DashboardService::new(store, QuarterCatalog::default())
}

fn investor_record() -> QuarterlyRecord {
    record(json!({
        "id": "c1",
        "paid_capital_q1_2023": 100_000.0,
        "nav_q1_2023": 95_000.0,
        "paid_capital_q3_2023": 150_000.0,
        "nav_q3_2023": 180_000.0,
        "paid_capital_q1_2024": 0,
        "nav_q1_2024": 0,
        "management_fee_q2_2023": -2_500.0,
    }))
}

#[test]
fn test_quarter_snapshot() {
    let company = investor_record();
    let snap = DashboardService::quarter_snapshot(Some(&company), q(2023, 3)).unwrap();
    assert_eq!(snap.paid_capital, 150_000.0);
    assert_eq!(snap.nav, 180_000.0);
    assert_eq!(snap.difference, 30_000.0);

    assert!(DashboardService::quarter_snapshot(Some(&company), q(2024, 1)).is_none());
    assert!(DashboardService::quarter_snapshot(None, q(2023, 3)).is_none());
}

#[test]
fn test_latest_snapshot_skips_empty_quarters() {
    let company = investor_record();
    let snap = dashboard(Arc::new(MemoryBackend::new()))
        .latest_snapshot(Some(&company))
        .unwrap();
    assert_eq!(snap.quarter, q(2023, 3));
}

#[test]
fn test_capital_series_ascending() {
    let company = investor_record();
    let series = dashboard(Arc::new(MemoryBackend::new())).capital_series(Some(&company));
    let labels: Vec<&str> = series.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["Q1 2023", "Q3 2023"]);
}

#[test]
fn test_performance_series_irr_in_percent() {
    let fund = record(json!({"tvpi_q4_2023": 1.2, "tvpi_q1_2024": 1.4, "irr_q1_2024": 0.082}));
    let series = dashboard(Arc::new(MemoryBackend::new())).performance_series(Some(&fund));
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].label, "Q4 2023");
    assert_eq!(series[0].irr, 0.0);
    assert!((series[1].irr - 8.2).abs() < 1e-9);
}

#[test]
fn test_fund_cards_cover_summary_metrics() {
    let fund = record(json!({"fund_size_q1_2024": 50_000_000.0, "irr_q1_2024": 0.1}));
    let cards = DashboardService::fund_cards(Some(&fund), q(2024, 1), Surface::Admin);
    assert_eq!(cards.len(), 10);
    assert_eq!(cards[0].label, "Fund Size");
    assert_eq!(cards[0].display, "€ 50.000.000");
    assert_eq!(cards[7].display, "10.0%");
    assert_eq!(cards[9].display, "€ 0");

    let empty = DashboardService::fund_cards(None, q(2024, 1), Surface::Investor);
    assert_eq!(empty[5].display, "0.0x");
}

#[test]
fn test_portfolio_rows() {
    let companies = vec![
        record(json!({"portfolio_company_name": "Acme", "total_investment_q2_2024": 200.0,
                      "total_value_q2_2024": 300.0, "latest_ownership": 0.12, "latest_valuation": 1e7})),
        record(json!({"portfolio_company_name": "Globex", "total_value_q2_2024": 50.0})),
    ];
    let rows = DashboardService::portfolio_rows(&companies, q(2024, 2));
    assert_eq!(rows[0].company_name, "Acme");
    assert_eq!(rows[0].multiple, 1.5);
    assert!(rows[0].is_positive_return());
    assert_eq!(rows[0].latest_ownership, Some(0.12));
    assert_eq!(rows[1].multiple, 0.0);
    assert_eq!(rows[1].latest_valuation, None);
    assert_eq!(rows[0].valuation_display(), "$10,000,000");
    assert_eq!(rows[1].valuation_display(), "$0");
}

#[test]
fn test_account_comparison_only_available_and_ascending() {
    let company = investor_record();
    let table = dashboard(Arc::new(MemoryBackend::new())).account_comparison(
        Some(&company),
        &tokens(&["2023-3", "2024-1", "2023-1", "2022-4", "2023-2"]),
    );
    assert_eq!(table.quarters, vec![q(2023, 1), q(2023, 2), q(2023, 3)]);
    assert_eq!(table.rows.len(), ACCOUNT_METRICS.len());
    assert_eq!(table.rows[0].label, "Paid Capital");
    assert_eq!(table.rows[0].cells, vec!["€100.000", "€0", "€150.000"]);
    let fees = table.rows.iter().find(|r| r.metric == Metric::ManagementFee).unwrap();
    assert_eq!(fees.cells[1], "€2.500");
}

#[test]
fn test_toggle_account_quarter() {
    let selected = tokens(&["2024-1", "2023-4"]);
    assert_eq!(toggle_account_quarter(&selected, "2023-4").unwrap(), tokens(&["2024-1"]));
    assert_eq!(
        toggle_account_quarter(&selected, "2023-3").unwrap(),
        tokens(&["2024-1", "2023-4", "2023-3"])
    );
    assert!(matches!(
        toggle_account_quarter(&selected, "garbage"),
        Err(CoreError::InvalidQuarter(_))
    ));
}

#[tokio::test]
async fn test_dashboard_reads_degrade_on_failure() {
    let service = dashboard(Arc::new(FailingStore));
    assert!(service.fund_level().await.is_none());
    assert!(service.portfolio_data().await.is_empty());
}

#[tokio::test]
async fn test_dashboard_fund_level_absent_is_none() {
    let service = dashboard(Arc::new(MemoryBackend::new()));
    assert!(service.fund_level().await.is_none());
}

#[tokio::test]
async fn test_dashboard_company_for_assigned_profile() {
    let store = Arc::new(MemoryBackend::new());
    store.seed(
        tables::COMPANY_DATA,
        vec![
            row(json!({"id": "c1", "company_name": "One", "nav_q1_2024": 1.0})),
            row(json!({"id": "c2", "company_name": "Two", "nav_q1_2024": 2.0})),
        ],
    );
    let service = dashboard(store);
    let mut profile: lp_portal_core::models::profile::Profile = serde_json::from_value(json!({
        "id": "u1", "email": "lp@example.com", "role": "lp", "is_approved": true,
        "assigned_company_id": "c2",
    }))
    .unwrap();

    let company = service.company_for(&profile).await.unwrap();
    assert_eq!(company.text("company_name"), Some("Two"));

    // Without an assignment the backend must narrow it to one row.
    profile.assigned_company_id = None;
    assert!(service.company_for(&profile).await.is_none());
}
