use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// A fiscal quarter, ordered by `(year, quarter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuarterRef {
    pub year: i32,
    /// 1..=4
    pub quarter: u8,
}

impl QuarterRef {
    /// Build a quarter, rejecting quarter numbers outside 1..=4.
    pub fn new(year: i32, quarter: u8) -> Result<Self, CoreError> {
        if !(1..=4).contains(&quarter) {
            return Err(CoreError::InvalidQuarter(format!(
                "quarter must be between 1 and 4, got {quarter}"
            )));
        }
        Ok(Self { year, quarter })
    }

    /// The calendar quarter containing `date`.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month0() / 3 + 1) as u8,
        }
    }

    /// Compact settings token, `"{year}-{quarter}"`.
    #[must_use]
    pub fn token(&self) -> String {
        format!("{}-{}", self.year, self.quarter)
    }

    /// Parse a `"{year}-{quarter}"` token.
    pub fn parse_token(token: &str) -> Result<Self, CoreError> {
        let (year, quarter) = token
            .trim()
            .split_once('-')
            .ok_or_else(|| CoreError::InvalidQuarter(format!("malformed token '{token}'")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| CoreError::InvalidQuarter(format!("bad year in token '{token}'")))?;
        let quarter: u8 = quarter
            .parse()
            .map_err(|_| CoreError::InvalidQuarter(format!("bad quarter in token '{token}'")))?;
        Self::new(year, quarter)
    }

    /// Display label, e.g. `"Q1 2024"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("Q{} {}", self.quarter, self.year)
    }

    /// The quarter immediately before this one.
    #[must_use]
    pub fn previous(&self) -> Self {
        if self.quarter <= 1 {
            Self { year: self.year - 1, quarter: 4 }
        } else {
            Self { year: self.year, quarter: self.quarter - 1 }
        }
    }
}

impl std::fmt::Display for QuarterRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{} {}", self.quarter, self.year)
    }
}

/// The (year, quarter) pairs the product supports.
///
/// Every year in `first_year..=last_year` carries Q1..Q4, except the last
/// year which stops at `last_year_max_quarter`. All call sites share one
/// catalog so the final-year restriction is applied uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterCatalog {
    pub first_year: i32,
    pub last_year: i32,
    pub last_year_max_quarter: u8,
}

impl Default for QuarterCatalog {
    fn default() -> Self {
        Self {
            first_year: 2021,
            last_year: 2025,
            last_year_max_quarter: 2,
        }
    }
}

impl QuarterCatalog {
    pub fn new(first_year: i32, last_year: i32, last_year_max_quarter: u8) -> Result<Self, CoreError> {
        if first_year > last_year {
            return Err(CoreError::Config(format!(
                "catalog first year {first_year} is after last year {last_year}"
            )));
        }
        if !(1..=4).contains(&last_year_max_quarter) {
            return Err(CoreError::Config(format!(
                "last-year quarter limit must be 1..=4, got {last_year_max_quarter}"
            )));
        }
        Ok(Self {
            first_year,
            last_year,
            last_year_max_quarter,
        })
    }

    /// Supported years, newest first.
    #[must_use]
    pub fn years_desc(&self) -> Vec<i32> {
        (self.first_year..=self.last_year).rev().collect()
    }

    /// Supported quarters of `year`, newest first. Empty outside the span.
    #[must_use]
    pub fn quarters_for(&self, year: i32) -> Vec<u8> {
        if year < self.first_year || year > self.last_year {
            return Vec::new();
        }
        let max = if year == self.last_year {
            self.last_year_max_quarter
        } else {
            4
        };
        (1..=max).rev().collect()
    }

    /// Every supported pair, strictly descending by `(year, quarter)`.
    #[must_use]
    pub fn candidates_desc(&self) -> Vec<QuarterRef> {
        self.years_desc()
            .into_iter()
            .flat_map(|year| {
                self.quarters_for(year)
                    .into_iter()
                    .map(move |quarter| QuarterRef { year, quarter })
            })
            .collect()
    }

    #[must_use]
    pub fn contains(&self, q: QuarterRef) -> bool {
        self.quarters_for(q.year).contains(&q.quarter)
    }

    #[must_use]
    pub fn latest(&self) -> QuarterRef {
        QuarterRef {
            year: self.last_year,
            quarter: self.last_year_max_quarter,
        }
    }

    #[must_use]
    pub fn earliest(&self) -> QuarterRef {
        QuarterRef {
            year: self.first_year,
            quarter: 1,
        }
    }

    /// Pull `q` into the supported span.
    #[must_use]
    pub fn clamp(&self, q: QuarterRef) -> QuarterRef {
        if q > self.latest() {
            self.latest()
        } else if q < self.earliest() {
            self.earliest()
        } else {
            q
        }
    }
}
