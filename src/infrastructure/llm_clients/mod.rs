pub mod gemini;

use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;

pub use gemini::GeminiClient;

/// Image attached to a completion request as a secondary content part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

/// One text/vision completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: InlineImage) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

#[async_trait]
pub trait LLMClient {
    /// Returns the first text part of the first candidate, or an empty
    /// string when the reply carries none. Transport failures and
    /// non-success statuses are `RemoteServiceFailure`.
    async fn generate(&self, config: &LLMConfig, request: &CompletionRequest) -> Result<String>;
}
