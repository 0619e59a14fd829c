use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::company::CompanySummary;
use super::link::UsefulLink;
use super::metric::Metric;
use super::profile::Profile;
use super::quarter::QuarterRef;
use super::record::QuarterlyRecord;

/// An investor's capital position in one quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterSnapshot {
    pub quarter: QuarterRef,
    pub paid_capital: f64,
    pub nav: f64,
    /// `nav - paid_capital`: unrealized gain, or loss when negative.
    pub difference: f64,
}

/// One point of the paid-capital vs NAV chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalPoint {
    pub label: String,
    pub paid_capital: f64,
    pub nav: f64,
}

/// One point of the fund TVPI / IRR chart. `irr` is already in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub label: String,
    pub tvpi: f64,
    pub irr: f64,
}

/// A rendered fund summary card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCard {
    pub metric: Metric,
    pub label: String,
    pub display: String,
}

/// An entry of a quarter picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterOption {
    pub quarter: QuarterRef,
    pub label: String,
    pub value: String,
    pub selected: bool,
}

/// A company line of the portfolio overview table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRow {
    pub company_name: String,
    pub total_investment: f64,
    pub total_value: f64,
    /// `total_value / total_investment`, zero when nothing was invested.
    pub multiple: f64,
    /// Ownership share as a decimal fraction.
    pub latest_ownership: Option<f64>,
    /// Latest round valuation in USD.
    pub latest_valuation: Option<f64>,
}

impl PortfolioRow {
    /// A multiple of at least 1.0 means the position is at or above cost.
    #[must_use]
    pub fn is_positive_return(&self) -> bool {
        self.multiple >= 1.0
    }

    #[must_use]
    pub fn valuation_display(&self) -> String {
        crate::formatting::format_valuation(self.latest_valuation)
    }
}

/// A metric line of the account comparison table, one rendered cell per
/// compared quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRow {
    pub metric: Metric,
    pub label: String,
    pub cells: Vec<String>,
}

/// The LP account comparison table: selected quarters oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountComparison {
    pub quarters: Vec<QuarterRef>,
    pub rows: Vec<AccountRow>,
}

impl AccountComparison {
    /// Header text of the quarter picker button.
    #[must_use]
    pub fn selector_label(&self) -> String {
        match self.quarters.len() {
            0 => "Select Quarters".to_string(),
            1 => "1 Quarter Selected".to_string(),
            n => format!("{n} Quarters Selected"),
        }
    }
}

/// Everything the investor dashboard renders, loaded in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpOverview {
    pub profile: Profile,
    /// Newest quarter of the investor's own account.
    pub latest: Option<QuarterSnapshot>,
    pub capital_series: Vec<CapitalPoint>,
    /// Quarter shown in the fund summary: the newest with fund data.
    pub fund_quarter: QuarterRef,
    pub fund_quarter_options: Vec<QuarterOption>,
    pub fund_cards: Vec<MetricCard>,
    pub performance_series: Vec<PerformancePoint>,
    pub portfolio_quarter: QuarterRef,
    pub portfolio_quarter_options: Vec<QuarterOption>,
    pub portfolio: Vec<PortfolioRow>,
    pub account_quarter_options: Vec<QuarterOption>,
    pub accounts: AccountComparison,
    pub links: Vec<UsefulLink>,
}

/// Everything the admin dashboard renders, loaded in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminOverview {
    pub investors: Vec<Profile>,
    pub companies: Vec<CompanySummary>,
    /// Profile id to assigned company id.
    pub assignments: HashMap<String, Option<String>>,
    pub fund_level: QuarterlyRecord,
    pub fund_quarter: QuarterRef,
    pub fund_quarter_options: Vec<QuarterOption>,
    pub fund_cards: Vec<MetricCard>,
    pub links: Vec<UsefulLink>,
}
