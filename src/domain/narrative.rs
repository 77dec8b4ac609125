use serde::{Deserialize, Serialize};

use super::fault_record::FaultRecord;

pub const DIAGNOSIS_LABEL: &str = "[التشخيص]";
pub const CAUSE_LABEL: &str = "[السبب المحتمل]";
pub const PART_LABEL: &str = "[القطعة المطلوبة]";
pub const TIP_LABEL: &str = "[نصيحة المهندس]";

pub const FALLBACK_DIAGNOSIS: &str = "تحليل تقني";
pub const FALLBACK_CAUSE: &str = "جاري فحص مسببات العطل";
pub const FALLBACK_PART: &str = "غير محدد بدقة";
pub const FALLBACK_TIP: &str = "يفضل الفحص اليدوي للتأكيد";

/// Structured fields pulled out of the model's free-text reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeResult {
    pub diagnosis: String,
    pub cause: String,
    pub part: String,
    pub tip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_code: Option<String>,
}

impl Default for NarrativeResult {
    fn default() -> Self {
        Self {
            diagnosis: FALLBACK_DIAGNOSIS.to_string(),
            cause: FALLBACK_CAUSE.to_string(),
            part: FALLBACK_PART.to_string(),
            tip: FALLBACK_TIP.to_string(),
            extracted_code: None,
        }
    }
}

/// Terminal artifact of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridReport {
    pub run_id: uuid::Uuid,
    pub narrative: NarrativeResult,
    pub matched_record: Option<FaultRecord>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl HybridReport {
    pub fn new(
        run_id: uuid::Uuid,
        narrative: NarrativeResult,
        matched_record: Option<FaultRecord>,
    ) -> Self {
        Self {
            run_id,
            narrative,
            matched_record,
            generated_at: chrono::Utc::now(),
        }
    }

    /// False renders as the explicit "no price-data match" notice.
    pub fn has_price_match(&self) -> bool {
        self.matched_record.is_some()
    }
}
