use serde::{Deserialize, Serialize};

use super::quarter::QuarterRef;

/// Key of the view-settings slot in the `user_preferences` table.
pub const VIEW_SETTINGS_KEY: &str = "global_view_settings";

/// Quarter selections shared by the dashboard views.
///
/// Serialized with the camelCase field names already present in stored
/// preference documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSettings {
    /// Quarter shown by the fund summary and the portfolio table.
    pub portfolio_quarter: QuarterRef,

    /// Quarters compared in the account details table, as `"{year}-{quarter}"` tokens.
    pub account_quarters: Vec<String>,
}

impl Default for ViewSettings {
    /// Used whenever the settings slot cannot be read or written.
    fn default() -> Self {
        Self {
            portfolio_quarter: QuarterRef { year: 2024, quarter: 1 },
            account_quarters: vec![
                "2024-1".to_string(),
                "2023-4".to_string(),
                "2023-3".to_string(),
                "2023-2".to_string(),
            ],
        }
    }
}

impl ViewSettings {
    /// Shallow merge: every field set in `patch` replaces ours wholesale.
    #[must_use]
    pub fn merged(&self, patch: &ViewSettingsPatch) -> Self {
        Self {
            portfolio_quarter: patch.portfolio_quarter.unwrap_or(self.portfolio_quarter),
            account_quarters: patch
                .account_quarters
                .clone()
                .unwrap_or_else(|| self.account_quarters.clone()),
        }
    }

    /// Account quarters that parse, in stored order.
    #[must_use]
    pub fn account_quarter_refs(&self) -> Vec<QuarterRef> {
        self.account_quarters
            .iter()
            .filter_map(|t| QuarterRef::parse_token(t).ok())
            .collect()
    }
}

/// Partial update for [`ViewSettings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_quarter: Option<QuarterRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_quarters: Option<Vec<String>>,
}

impl ViewSettingsPatch {
    pub fn portfolio_quarter(q: QuarterRef) -> Self {
        Self {
            portfolio_quarter: Some(q),
            ..Default::default()
        }
    }

    pub fn account_quarters(tokens: Vec<String>) -> Self {
        Self {
            account_quarters: Some(tokens),
            ..Default::default()
        }
    }
}
