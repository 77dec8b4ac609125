use serde::{Deserialize, Serialize};

/// The single input of one analysis run.
///
/// A voice query carries the transcript produced by the external speech
/// capture; from here on it is handled exactly like typed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiagnosticQuery {
    Text {
        content: String,
    },
    Voice {
        content: String,
    },
    Image {
        /// Base64 payload without any data-URL prefix.
        content: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Words typed or spoken alongside the photo. Not sent to the
        /// model, only used for matching.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl DiagnosticQuery {
    /// The user's own words, used for the fault-code and keyword fallbacks.
    pub fn query_text(&self) -> &str {
        match self {
            DiagnosticQuery::Text { content } | DiagnosticQuery::Voice { content } => content,
            DiagnosticQuery::Image { note, .. } => note.as_deref().unwrap_or(""),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosticQuery::Text { .. } => "text",
            DiagnosticQuery::Voice { .. } => "voice",
            DiagnosticQuery::Image { .. } => "image",
        }
    }
}
