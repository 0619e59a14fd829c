use serde::{Deserialize, Serialize};

use super::quarter::QuarterRef;

/// How a metric is rendered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    /// Euro amount, rounded to whole units.
    Currency,
    /// Euro amount shown as its magnitude (fees, opex are stored negative).
    AbsoluteCurrency,
    /// Multiple of invested capital, e.g. `1.40x`.
    Multiplier,
    /// Stored as a decimal fraction, shown ×100 with a `%` suffix.
    Percentage,
    /// Plain count.
    Count,
}

/// A tracked quarterly metric. Each one is stored as a family of columns
/// named `{prefix}_q{quarter}_{year}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    FundSize,
    LpCount,
    CalledCapital,
    InvestmentCost,
    InvestmentValue,
    Tvpi,
    Moic,
    Irr,
    ManagementFee,
    Opex,
    PaidCapital,
    Nav,
    Distributions,
    UnrealizedGains,
    RealizedGains,
    TotalInvestment,
    TotalValue,
}

/// Fund summary cards, in display order.
pub const FUND_METRICS: [Metric; 10] = [
    Metric::FundSize,
    Metric::LpCount,
    Metric::CalledCapital,
    Metric::InvestmentCost,
    Metric::InvestmentValue,
    Metric::Tvpi,
    Metric::Moic,
    Metric::Irr,
    Metric::ManagementFee,
    Metric::Opex,
];

/// Per-investor account columns on `company_data`.
pub const ACCOUNT_METRICS: [Metric; 7] = [
    Metric::PaidCapital,
    Metric::Nav,
    Metric::ManagementFee,
    Metric::Opex,
    Metric::Distributions,
    Metric::UnrealizedGains,
    Metric::RealizedGains,
];

/// Per-company columns on `portfolio_data`.
pub const PORTFOLIO_METRICS: [Metric; 2] = [Metric::TotalInvestment, Metric::TotalValue];

/// Every metric family the portal knows about.
pub const ALL_METRICS: [Metric; 17] = [
    Metric::FundSize,
    Metric::LpCount,
    Metric::CalledCapital,
    Metric::InvestmentCost,
    Metric::InvestmentValue,
    Metric::Tvpi,
    Metric::Moic,
    Metric::Irr,
    Metric::ManagementFee,
    Metric::Opex,
    Metric::PaidCapital,
    Metric::Nav,
    Metric::Distributions,
    Metric::UnrealizedGains,
    Metric::RealizedGains,
    Metric::TotalInvestment,
    Metric::TotalValue,
];

impl Metric {
    /// Column-name prefix.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Metric::FundSize => "fund_size",
            Metric::LpCount => "lp_count",
            Metric::CalledCapital => "called_capital",
            Metric::InvestmentCost => "investment_cost",
            Metric::InvestmentValue => "investment_value",
            Metric::Tvpi => "tvpi",
            Metric::Moic => "moic",
            Metric::Irr => "irr",
            Metric::ManagementFee => "management_fee",
            Metric::Opex => "opex",
            Metric::PaidCapital => "paid_capital",
            Metric::Nav => "nav",
            Metric::Distributions => "distributions",
            Metric::UnrealizedGains => "unrealized_gains",
            Metric::RealizedGains => "realized_gains",
            Metric::TotalInvestment => "total_investment",
            Metric::TotalValue => "total_value",
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Metric::FundSize => "Fund Size",
            Metric::LpCount => "Number of LPs",
            Metric::CalledCapital => "Total Called Capital",
            Metric::InvestmentCost => "Total Investment Cost",
            Metric::InvestmentValue => "Total Investment Value",
            Metric::Tvpi => "TVPI",
            Metric::Moic => "MoIC",
            Metric::Irr => "IRR",
            Metric::ManagementFee => "Management Fee",
            Metric::Opex => "OPEX",
            Metric::PaidCapital => "Paid Capital",
            Metric::Nav => "NAV",
            Metric::Distributions => "Distributions",
            Metric::UnrealizedGains => "Unrealized Gains",
            Metric::RealizedGains => "Realized Gains",
            Metric::TotalInvestment => "Total Investment",
            Metric::TotalValue => "Total Value",
        }
    }

    #[must_use]
    pub fn unit(&self) -> MetricUnit {
        match self {
            Metric::Tvpi | Metric::Moic => MetricUnit::Multiplier,
            Metric::Irr => MetricUnit::Percentage,
            Metric::LpCount => MetricUnit::Count,
            Metric::ManagementFee | Metric::Opex => MetricUnit::AbsoluteCurrency,
            _ => MetricUnit::Currency,
        }
    }

    /// Column holding this metric for `q`, e.g. `tvpi_q1_2024`.
    #[must_use]
    pub fn column(&self, q: QuarterRef) -> String {
        format!("{}_q{}_{}", self.prefix(), q.quarter, q.year)
    }

    /// Look a metric up by its column prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Metric> {
        ALL_METRICS.iter().copied().find(|m| m.prefix() == prefix)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
