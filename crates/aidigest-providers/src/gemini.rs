//! Gemini `generateContent` wire format.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::shared::{ChatError, ChatErrorKind, ChatResult, format_safety_ratings};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

impl GenerateContentRequest {
    pub(crate) fn new(prompt: &str, system: Option<&str>) -> Self {
        let text_content = |text: &str| Content {
            parts: vec![Part {
                text: text.to_string(),
            }],
        };
        Self {
            contents: vec![text_content(prompt)],
            system_instruction: system
                .filter(|s| !s.trim().is_empty())
                .map(text_content),
        }
    }
}

pub(crate) fn endpoint(base_url: &str, model: &str, stream: bool) -> String {
    let base = base_url.trim_end_matches('/');
    if stream {
        format!("{base}/v1beta/models/{model}:streamGenerateContent?alt=sse")
    } else {
        format!("{base}/v1beta/models/{model}:generateContent")
    }
}

fn block_reason(event: &Value) -> Option<String> {
    let reason = event.pointer("/promptFeedback/blockReason")?;
    match reason {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn prompt_blocked(event: &Value, reason: &str) -> ChatError {
    let ratings = format_safety_ratings(event.pointer("/promptFeedback/safetyRatings"));
    warn!(reason, "Gemini prompt blocked");
    ChatError::new(
        ChatErrorKind::PromptBlocked,
        format!("Gemini Chat prompt blocked: {reason}. Safety ratings: {ratings}"),
    )
}

fn first_candidate(event: &Value) -> Option<&Value> {
    event
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
}

fn candidate_text(candidate: &Value) -> Option<&str> {
    candidate
        .pointer("/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// Per-stream decoding state for Gemini events.
#[derive(Debug, Default)]
pub struct GeminiDecoder {
    has_yielded: bool,
    last_finish_reason: Option<String>,
    last_safety_ratings: Option<Value>,
}

impl GeminiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one parsed event, returning its text fragment if any.
    ///
    /// # Errors
    /// Fails on a prompt block, a non-STOP finish reason or an error event.
    pub fn decode_event(&mut self, event: &Value) -> ChatResult<Option<String>> {
        if let Some(reason) = block_reason(event) {
            return Err(prompt_blocked(event, &reason));
        }

        if let Some(candidate) = first_candidate(event) {
            if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
                self.last_finish_reason = Some(reason.to_string());
                self.last_safety_ratings = candidate.get("safetyRatings").cloned();

                if reason != "STOP" {
                    let ratings = format_safety_ratings(self.last_safety_ratings.as_ref());
                    warn!(reason, "Gemini stream finished early");
                    if reason == "SAFETY" {
                        return Err(ChatError::new(
                            ChatErrorKind::Safety,
                            format!(
                                "Gemini Chat content generation blocked due to safety ({reason}). Safety ratings: {ratings}"
                            ),
                        ));
                    }
                    return Err(ChatError::new(
                        ChatErrorKind::Finished,
                        format!("Gemini Chat stream finished due to: {reason}. Safety ratings: {ratings}"),
                    ));
                }
            }

            if let Some(text) = candidate_text(candidate) {
                self.has_yielded = true;
                return Ok(Some(text.to_string()));
            }
            return Ok(None);
        }

        if let Some(error) = event.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Unknown error in stream");
            return Err(ChatError::new(
                ChatErrorKind::Api,
                format!("Gemini Chat API stream error: {message}"),
            ));
        }

        debug!("Gemini event without candidates ignored");
        Ok(None)
    }

    /// Final check once the body is drained.
    ///
    /// # Errors
    /// Fails when no fragment was ever produced.
    pub fn finish(&self) -> ChatResult<()> {
        if self.has_yielded {
            return Ok(());
        }
        let message = match self.last_finish_reason.as_deref() {
            Some("STOP") => "Gemini Chat stream completed with 'STOP' but yielded no content.".to_string(),
            Some(reason) => {
                let ratings = format_safety_ratings(self.last_safety_ratings.as_ref());
                format!(
                    "Gemini Chat stream completed due to {reason} without yielding content. Safety ratings: {ratings}"
                )
            }
            None => "Gemini Chat stream completed without yielding any content.".to_string(),
        };
        Err(ChatError::new(ChatErrorKind::Empty, message))
    }
}

/// Extracts the answer from a non-streaming `generateContent` response.
///
/// # Errors
/// Same block and finish-reason rules as the stream, collapsed to one check.
pub fn parse_response(body: &Value) -> ChatResult<String> {
    if let Some(reason) = block_reason(body) {
        return Err(prompt_blocked(body, &reason));
    }

    let Some(candidate) = first_candidate(body) else {
        return Err(ChatError::new(
            ChatErrorKind::Empty,
            "Gemini Chat API returned an empty or malformed response with no candidates.",
        ));
    };

    if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str)
        && reason != "STOP"
    {
        let ratings = format_safety_ratings(candidate.get("safetyRatings"));
        warn!(reason, "Gemini generation finished early");
        let (kind, message) = if reason == "SAFETY" {
            (
                ChatErrorKind::Safety,
                format!(
                    "Gemini Chat content generation blocked due to safety ({reason}). Safety ratings: {ratings}"
                ),
            )
        } else {
            (
                ChatErrorKind::Finished,
                format!(
                    "Gemini Chat content generation finished due to: {reason}. Safety ratings: {ratings}"
                ),
            )
        };
        return Err(ChatError::new(kind, message));
    }

    candidate_text(candidate).map(str::to_string).ok_or_else(|| {
        ChatError::new(
            ChatErrorKind::Empty,
            "Gemini Chat API returned a candidate with 'STOP' finishReason but no text content.",
        )
    })
}
