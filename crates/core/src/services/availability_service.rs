use chrono::NaiveDate;

use crate::models::dashboard::QuarterOption;
use crate::models::metric::{Metric, ALL_METRICS};
use crate::models::quarter::{QuarterCatalog, QuarterRef};
use crate::models::record::QuarterlyRecord;

/// Works out which quarters actually hold data in sparse wide rows.
///
/// A quarter is available when any tracked metric column for it is present
/// (non-null, non-zero) in any of the given records: a union across rows,
/// never an intersection. Candidates are always walked in the catalog's
/// explicit newest-first order, so results depend only on which cells are
/// present and never on column order in the row.
#[derive(Debug, Clone)]
pub struct AvailabilityService {
    catalog: QuarterCatalog,
    metrics: Vec<Metric>,
}

/// Borrow an optional single record as a record slice.
#[must_use]
pub fn records_of(record: Option<&QuarterlyRecord>) -> &[QuarterlyRecord] {
    record.map(std::slice::from_ref).unwrap_or(&[])
}

impl AvailabilityService {
    /// Track every known metric.
    pub fn new(catalog: QuarterCatalog) -> Self {
        Self::with_metrics(catalog, &ALL_METRICS)
    }

    /// Track only `metrics` (e.g. the portfolio columns).
    pub fn with_metrics(catalog: QuarterCatalog, metrics: &[Metric]) -> Self {
        Self {
            catalog,
            metrics: metrics.to_vec(),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &QuarterCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// `true` when any record holds a tracked metric for `q`.
    #[must_use]
    pub fn has_data(&self, records: &[QuarterlyRecord], q: QuarterRef) -> bool {
        records.iter().any(|r| r.has_data(q, &self.metrics))
    }

    /// Quarters of `year` with data, newest first. Empty when nothing is
    /// present or the year is outside the catalog.
    #[must_use]
    pub fn available_quarters(&self, records: &[QuarterlyRecord], year: i32) -> Vec<u8> {
        self.catalog
            .quarters_for(year)
            .into_iter()
            .filter(|&quarter| self.has_data(records, QuarterRef { year, quarter }))
            .collect()
    }

    /// Every available quarter, strictly descending.
    #[must_use]
    pub fn available(&self, records: &[QuarterlyRecord]) -> Vec<QuarterRef> {
        self.catalog
            .candidates_desc()
            .into_iter()
            .filter(|&q| self.has_data(records, q))
            .collect()
    }

    /// Newest quarter with data, or the catalog's first quarter (Q1 2021 by
    /// default) when there is none.
    #[must_use]
    pub fn latest_quarter(&self, records: &[QuarterlyRecord]) -> QuarterRef {
        self.catalog
            .candidates_desc()
            .into_iter()
            .find(|&q| self.has_data(records, q))
            .unwrap_or_else(|| self.catalog.earliest())
    }

    /// Up to `n` newest quarters with data as `"{year}-{quarter}"` tokens,
    /// most recent first. Fewer are returned when data runs out; when no
    /// quarter has data at all, a synthetic sequence counting back from the
    /// calendar quarter of `today` (clamped into the catalog) is used.
    #[must_use]
    pub fn latest_n_quarters(&self, records: &[QuarterlyRecord], n: usize, today: NaiveDate) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }
        let found: Vec<String> = self
            .catalog
            .candidates_desc()
            .into_iter()
            .filter(|&q| self.has_data(records, q))
            .take(n)
            .map(|q| q.token())
            .collect();

        if found.is_empty() {
            self.fallback_sequence(n, today)
        } else {
            found
        }
    }

    /// `n` quarters counting back from today's quarter, stopping at the
    /// start of the catalog.
    #[must_use]
    pub fn fallback_sequence(&self, n: usize, today: NaiveDate) -> Vec<String> {
        let earliest = self.catalog.earliest();
        let mut current = self.catalog.clamp(QuarterRef::containing(today));
        let mut tokens = Vec::with_capacity(n);
        while tokens.len() < n && current >= earliest {
            tokens.push(current.token());
            current = current.previous();
        }
        tokens
    }

    /// Picker options: every available quarter, newest first, flagged when
    /// its token is in `selected`.
    #[must_use]
    pub fn quarter_options(&self, records: &[QuarterlyRecord], selected: &[String]) -> Vec<QuarterOption> {
        self.available(records)
            .into_iter()
            .map(|q| {
                let value = q.token();
                QuarterOption {
                    quarter: q,
                    label: q.label(),
                    selected: selected.contains(&value),
                    value,
                }
            })
            .collect()
    }
}
