use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metric::Metric;
use super::quarter::QuarterRef;

/// A raw table row as exchanged with the backend.
pub type Row = Map<String, Value>;

/// Presence rule shared by every quarter lookup: a value counts only when it
/// exists, is a finite number and is non-zero. A stored `0` is treated as
/// "not entered yet", so a genuinely zero metric cannot be told apart from a
/// missing one.
#[must_use]
pub fn is_present(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v.is_finite() && v != 0.0)
}

/// A wide, sparse row (`fund_level`, `company_data`, `portfolio_data`).
///
/// Quarterly metrics live in columns named `{metric}_q{quarter}_{year}`;
/// every column is independently nullable. Non-metric columns (ids, names)
/// are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuarterlyRecord {
    pub fields: Row,
}

impl QuarterlyRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_row(row: Row) -> Self {
        Self { fields: row }
    }

    /// Numeric value of a column. Strings holding numbers are accepted
    /// since Postgres `numeric` columns arrive as text.
    #[must_use]
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.fields.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(Value::as_str)
    }

    /// Row id, rendered as a string whatever its JSON type.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn metric(&self, metric: Metric, q: QuarterRef) -> Option<f64> {
        self.number(&metric.column(q))
    }

    /// Metric value with absence read as zero, the way display code reads it.
    #[must_use]
    pub fn metric_or_zero(&self, metric: Metric, q: QuarterRef) -> f64 {
        self.metric(metric, q)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// `true` when any of `metrics` is present for `q`.
    #[must_use]
    pub fn has_data(&self, q: QuarterRef, metrics: &[Metric]) -> bool {
        metrics.iter().any(|m| is_present(self.metric(*m, q)))
    }

    /// Set a metric cell; `None` stores SQL null.
    pub fn set_metric(&mut self, metric: Metric, q: QuarterRef, value: Option<f64>) {
        let json = value
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.fields.insert(metric.column(q), json);
    }

    /// Builder-style variant of [`set_metric`](Self::set_metric).
    #[must_use]
    pub fn with_metric(mut self, metric: Metric, q: QuarterRef, value: f64) -> Self {
        self.set_metric(metric, q, Some(value));
        self
    }

    #[must_use]
    pub fn with_field(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(column.to_string(), value.into());
        self
    }
}

impl From<Row> for QuarterlyRecord {
    fn from(row: Row) -> Self {
        Self::from_row(row)
    }
}
