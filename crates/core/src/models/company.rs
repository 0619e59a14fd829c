use serde::{Deserialize, Serialize};

/// Columns of `company_data` shown in the admin company table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub id: String,
    pub company_no: String,
    pub company_name: String,
    #[serde(default)]
    pub total_commitment: f64,
}

/// Sortable columns of the company table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanySortField {
    CompanyNo,
    CompanyName,
    TotalCommitment,
}

impl CompanySortField {
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            CompanySortField::CompanyNo => "company_no",
            CompanySortField::CompanyName => "company_name",
            CompanySortField::TotalCommitment => "total_commitment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn toggled(&self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Current sort of the company table. Clicking the active column flips the
/// direction; clicking another column sorts it ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanySort {
    pub field: CompanySortField,
    pub direction: SortDirection,
}

impl Default for CompanySort {
    fn default() -> Self {
        Self {
            field: CompanySortField::CompanyNo,
            direction: SortDirection::Asc,
        }
    }
}

impl CompanySort {
    #[must_use]
    pub fn clicked(&self, field: CompanySortField) -> Self {
        if field == self.field {
            Self {
                field,
                direction: self.direction.toggled(),
            }
        } else {
            Self {
                field,
                direction: SortDirection::Asc,
            }
        }
    }
}
