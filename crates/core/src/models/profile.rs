use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portal role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Lp,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Lp => write!(f, "lp"),
        }
    }
}

/// Review state of an LP registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub status: Option<ApprovalStatus>,
    #[serde(default)]
    pub assigned_company_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Effective status; rows written before the column existed derive it
    /// from the approval flag.
    #[must_use]
    pub fn effective_status(&self) -> ApprovalStatus {
        self.status.unwrap_or(if self.is_approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        })
    }
}

/// Attributes collected by the registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpAttributes {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub role: Role,
}
