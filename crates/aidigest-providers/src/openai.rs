//! OpenAI chat completions wire format.

use serde::Serialize;
use serde_json::Value;

use crate::shared::{ChatError, ChatErrorKind, ChatResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: &'static str,
    content: String,
}

impl ChatCompletionRequest {
    pub(crate) fn new(model: &str, prompt: &str, system: Option<&str>, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatCompletionMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatCompletionMessage {
            role: "user",
            content: prompt.to_string(),
        });
        Self {
            model: model.to_string(),
            messages,
            temperature: 1.0,
            max_tokens: 2048,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stream,
        }
    }
}

pub(crate) fn endpoint(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

fn first_choice(event: &Value) -> Option<&Value> {
    event
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
}

/// Per-stream decoding state for OpenAI events.
#[derive(Debug, Default)]
pub struct OpenAIDecoder {
    has_yielded: bool,
}

impl OpenAIDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one parsed event, returning `choices[0].delta.content` if any.
    ///
    /// # Errors
    /// Fails when the event carries an `error` object and no choices.
    pub fn decode_event(&mut self, event: &Value) -> ChatResult<Option<String>> {
        if let Some(choice) = first_choice(event) {
            let content = choice
                .pointer("/delta/content")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty());
            if let Some(content) = content {
                self.has_yielded = true;
                return Ok(Some(content.to_string()));
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
                format!("OpenAI Chat API stream error: {message}"),
            ));
        }

        Ok(None)
    }

    /// Final check once the body is drained.
    ///
    /// # Errors
    /// Fails when no fragment was ever produced.
    pub fn finish(&self) -> ChatResult<()> {
        if self.has_yielded {
            Ok(())
        } else {
            Err(ChatError::new(
                ChatErrorKind::Empty,
                "OpenAI Chat stream completed but yielded no content.",
            ))
        }
    }
}

/// Extracts `choices[0].message.content` from a non-streaming response.
///
/// # Errors
/// Fails when the content is missing.
pub fn parse_response(body: &Value) -> ChatResult<String> {
    first_choice(body)
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ChatError::new(
                ChatErrorKind::Empty,
                "OpenAI Chat API returned an empty or malformed response.",
            )
        })
}
