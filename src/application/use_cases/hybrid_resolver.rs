use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::application::use_cases::fault_catalog::FaultRecordStore;
use crate::application::use_cases::narrative_extractor;
use crate::domain::diagnostic_query::DiagnosticQuery;
use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use crate::domain::narrative::HybridReport;
use crate::infrastructure::llm_clients::{CompletionRequest, InlineImage, LLMClient};

/// Role and mandatory output format sent ahead of every query.
pub const SYSTEM_INSTRUCTION: &str = "أنت CAR_DOC AI Engine، خبير ميكانيكا مصري تعمل لصالح المهندس أحمد شاذلي.
حلل العطل بناءً على المدخلات (نص أو صورة) وقدم تشخيصاً دقيقاً ومختصراً بلهجة مصرية احترافية.
مهم جداً: إذا اكتشفت كود عطل (مثل P0171 أو P0300) يجب كتابته في أول سطر بتنسيق [CODE: XXXX].
تنسيق الرد الإلزامي:
[التشخيص]: (اسم المشكلة)
[السبب المحتمل]: (لماذا حدث العطل)
[القطعة المطلوبة]: (اسم قطعة الغيار)
[نصيحة المهندس]: (نصيحة فنية للمستخدم)";

const TEXT_QUERY_INTRO: &str = "\nعطل المستخدم هو: ";
const IMAGE_QUERY_NOTE: &str = "\nالمستخدم أرفق صورة لعطل، حللها وقدم التقرير.";

/// Sends one query to the completion service and cross-references the
/// reply against the fault table.
#[derive(Clone)]
pub struct HybridResolver {
    llm_client: Arc<dyn LLMClient + Send + Sync>,
    config: LLMConfig,
}

impl HybridResolver {
    pub fn new(llm_client: Arc<dyn LLMClient + Send + Sync>, config: LLMConfig) -> Self {
        Self { llm_client, config }
    }

    pub fn build_request(query: &DiagnosticQuery) -> CompletionRequest {
        match query {
            DiagnosticQuery::Text { content } | DiagnosticQuery::Voice { content } => {
                CompletionRequest::text(format!("{}{}{}", SYSTEM_INSTRUCTION, TEXT_QUERY_INTRO, content))
            }
            DiagnosticQuery::Image {
                content,
                mime_type,
                ..
            } => CompletionRequest::with_image(
                format!("{}{}", SYSTEM_INSTRUCTION, IMAGE_QUERY_NOTE),
                InlineImage {
                    mime_type: mime_type.clone(),
                    data: content.clone(),
                },
            ),
        }
    }

    /// Single attempt. Only a failed remote call is an error; extraction and
    /// lookup misses degrade to fallbacks and `None`.
    pub async fn resolve(
        &self,
        run_id: Uuid,
        query: &DiagnosticQuery,
        store: &FaultRecordStore,
    ) -> Result<HybridReport> {
        let request = Self::build_request(query);

        let raw_reply = self
            .llm_client
            .generate(&self.config, &request)
            .await
            .map_err(|err| {
                warn!(run_id = %run_id, error = %err, "Completion request failed");
                err
            })?;

        let query_text = query.query_text();
        let narrative = narrative_extractor::extract(&raw_reply, query_text);

        let matched_record = match narrative.extracted_code.as_deref() {
            Some(code) => store.find_by_code(code),
            None => store.find_by_keyword(&[raw_reply.as_str(), query_text]),
        }
        .cloned();

        info!(
            run_id = %run_id,
            kind = query.kind(),
            code = narrative.extracted_code.as_deref().unwrap_or("-"),
            price_match = matched_record.is_some(),
            "Diagnosis resolved"
        );

        Ok(HybridReport::new(run_id, narrative, matched_record))
    }
}
