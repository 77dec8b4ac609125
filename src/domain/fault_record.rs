use serde::{Deserialize, Serialize};

/// Supplier shown when a table row leaves the `source` column blank.
pub const DEFAULT_SOURCE: &str = "سوق الحرفيين/التوفيقية";

/// One row of the fault price table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    pub code: String,
    pub description: String,
    pub part: String,
    pub price: String,
    pub hours: String,
    pub labor_cost: String,
    pub source: String,
}

impl FaultRecord {
    /// Case-insensitive comparison against a diagnostic trouble code.
    pub fn matches_code(&self, code: &str) -> bool {
        self.code.to_uppercase() == code.to_uppercase()
    }
}
