use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::domain::diagnostic_query::DiagnosticQuery;
use crate::domain::error::{AppError, Result};

/// Used when the caller gives no MIME type and the bytes are not recognised.
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    /// Raw base64 or a `data:<mime>;base64,<payload>` URL.
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Whatever the capture widgets produced for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub image: Option<ImageInput>,
}

/// Result of a single-shot capture widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedInput {
    Transcript(String),
    Image(ImageInput),
}

impl From<CapturedInput> for RawInput {
    fn from(captured: CapturedInput) -> Self {
        match captured {
            CapturedInput::Transcript(transcript) => RawInput {
                transcript: Some(transcript),
                ..RawInput::default()
            },
            CapturedInput::Image(image) => RawInput {
                image: Some(image),
                ..RawInput::default()
            },
        }
    }
}

/// Picks the one query of a run: image, then transcript, then text.
/// Words sent along with an image ride on it as a matching note.
/// `Ok(None)` when nothing usable was supplied.
pub fn normalize(input: RawInput) -> Result<Option<DiagnosticQuery>> {
    if let Some(image) = input.image {
        let note = non_blank(input.transcript).or_else(|| non_blank(input.text));
        if note.is_some() {
            debug!("Image supplied together with text, the text is kept for matching only");
        }
        return normalize_image(image, note).map(Some);
    }

    if let Some(content) = non_blank(input.transcript) {
        return Ok(Some(DiagnosticQuery::Voice { content }));
    }

    Ok(non_blank(input.text).map(|content| DiagnosticQuery::Text { content }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_image(image: ImageInput, note: Option<String>) -> Result<DiagnosticQuery> {
    let (url_mime, payload) = split_data_url(image.data.trim())?;
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(AppError::ValidationError("Image payload is empty".to_string()));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| AppError::ValidationError(format!("Image is not valid base64: {}", e)))?;

    let mime_type = image
        .mime_type
        .filter(|mime| !mime.trim().is_empty())
        .or(url_mime)
        .unwrap_or_else(|| sniff_mime(&bytes));

    Ok(DiagnosticQuery::Image {
        content: payload,
        mime_type,
        note,
    })
}

/// `data:image/jpeg;base64,AAAA` -> (Some("image/jpeg"), "AAAA").
fn split_data_url(data: &str) -> Result<(Option<String>, &str)> {
    let Some(rest) = data.strip_prefix("data:") else {
        return Ok((None, data));
    };

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AppError::ValidationError("Malformed data URL".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(AppError::ValidationError(
            "Only base64 data URLs are supported".to_string(),
        ));
    }

    let mime = header.trim_end_matches(";base64").trim();
    Ok(((!mime.is_empty()).then(|| mime.to_string()), payload))
}

fn sniff_mime(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| DEFAULT_IMAGE_MIME.to_string())
}

/// Waits for the single value a capture widget produces. Returns
/// `InvalidState` if the session ends first or the widget goes away
/// without producing anything.
pub async fn await_capture(
    capture: oneshot::Receiver<CapturedInput>,
    session_end: &mut watch::Receiver<bool>,
) -> Result<CapturedInput> {
    if *session_end.borrow() {
        return Err(AppError::InvalidState("session already ended".to_string()));
    }

    tokio::select! {
        captured = capture => captured
            .map_err(|_| AppError::InvalidState("capture closed without a result".to_string())),
        _ = session_end.wait_for(|ended| *ended) => {
            Err(AppError::InvalidState("session ended during capture".to_string()))
        }
    }
}

/// Hands one captured value from an external capture widget to the run
/// waiting for it. Only one capture can be open at a time.
#[derive(Debug, Default)]
pub struct CaptureRelay {
    pending: Mutex<Option<oneshot::Sender<CapturedInput>>>,
}

impl CaptureRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the slot for the next capture. A capture that was still open is
    /// abandoned and its waiter sees the widget close.
    pub fn open(&self) -> oneshot::Receiver<CapturedInput> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pending.replace(tx).is_some() {
            debug!("Replacing an unclaimed capture");
        }
        rx
    }

    /// Delivers the widget's single value. Fails when nothing is waiting,
    /// which also rejects a second value for the same capture.
    pub fn deliver(&self, captured: CapturedInput) -> Result<()> {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| AppError::InvalidState("no capture is waiting".to_string()))?;

        sender
            .send(captured)
            .map_err(|_| AppError::InvalidState("capture was abandoned".to_string()))
    }
}
