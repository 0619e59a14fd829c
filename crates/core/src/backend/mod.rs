pub mod memory;
pub mod query;
pub mod rest;
pub mod traits;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::CoreError;
use crate::models::record::Row;

/// Table names of the portal schema.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const COMPANY_DATA: &str = "company_data";
    pub const FUND_LEVEL: &str = "fund_level";
    pub const PORTFOLIO_DATA: &str = "portfolio_data";
    pub const USEFUL_LINKS: &str = "useful_links";
    pub const USER_PREFERENCES: &str = "user_preferences";
}

/// Decode a backend row into a typed model.
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, CoreError> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| CoreError::Deserialization(format!("Failed to decode row: {e}")))
}

/// Encode a typed model as a backend row. Only structs are accepted.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row, CoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(CoreError::Serialization(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(CoreError::Serialization(e.to_string())),
    }
}
