//! Display formatting for metric values. Pure functions, no I/O.
//!
//! Missing or non-finite inputs render as the zero value of their unit
//! (`"€0"`, `"0.0%"`, `"0.00x"`), never as an empty string.

use crate::models::metric::{Metric, MetricUnit};

/// Currency rendering variants used by the dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyStyle {
    /// `€ 1.234.567`: admin fund summary.
    EuroSpaced,
    /// `€1.234.567`: investor dashboard.
    Euro,
    /// `$1,234,567`: portfolio company valuations.
    Dollar,
}

/// The dashboard a value is rendered on. Each surface keeps its own
/// currency glyph spacing and multiplier precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Admin,
    Investor,
}

impl Surface {
    #[must_use]
    pub fn currency_style(&self) -> CurrencyStyle {
        match self {
            Surface::Admin => CurrencyStyle::EuroSpaced,
            Surface::Investor => CurrencyStyle::Euro,
        }
    }

    #[must_use]
    pub fn multiplier_precision(&self) -> usize {
        match self {
            Surface::Admin => 2,
            Surface::Investor => 1,
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Group the integer part of `n` in threes.
fn group_digits(n: i64, separator: char) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Whole-unit currency, half away from zero, locale-grouped.
#[must_use]
pub fn format_currency(value: f64, style: CurrencyStyle) -> String {
    let rounded = finite_or_zero(value).round() as i64;
    match style {
        CurrencyStyle::EuroSpaced => format!("€ {}", group_digits(rounded, '.')),
        CurrencyStyle::Euro => format!("€{}", group_digits(rounded, '.')),
        CurrencyStyle::Dollar => format!("${}", group_digits(rounded, ',')),
    }
}

/// Latest round valuation of a portfolio company, e.g. `$12,500,000`.
#[must_use]
pub fn format_valuation(value: Option<f64>) -> String {
    format_currency(value.unwrap_or(0.0), CurrencyStyle::Dollar)
}

/// Chart axis amounts in whole millions, e.g. `€12m`.
#[must_use]
pub fn format_millions(value: f64) -> String {
    let millions = (finite_or_zero(value) / 1_000_000.0).round() as i64;
    format!("€{millions}m")
}

/// `2.5` at precision 2 is `"2.50x"`.
#[must_use]
pub fn format_multiplier(value: f64, precision: usize) -> String {
    format!("{:.*}x", precision, normalize_zero(finite_or_zero(value)))
}

/// Decimal fraction as percent with one decimal: `0.153` is `"15.3%"`.
#[must_use]
pub fn format_percentage(fraction: f64) -> String {
    format!("{:.1}%", normalize_zero(finite_or_zero(fraction) * 100.0))
}

/// Plain count; whole numbers print without a fractional part.
#[must_use]
pub fn format_count(value: f64) -> String {
    format!("{}", normalize_zero(finite_or_zero(value)))
}

fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Render a metric cell for `surface`. Absent values count as zero; fees
/// and opex are shown as their magnitude.
#[must_use]
pub fn format_metric(metric: Metric, value: Option<f64>, surface: Surface) -> String {
    let value = value.map(finite_or_zero).unwrap_or(0.0);
    match metric.unit() {
        MetricUnit::Percentage => format_percentage(value),
        MetricUnit::Multiplier => format_multiplier(value, surface.multiplier_precision()),
        MetricUnit::Count => format_count(value),
        MetricUnit::AbsoluteCurrency => format_currency(value.abs(), surface.currency_style()),
        MetricUnit::Currency => format_currency(value, surface.currency_style()),
    }
}
