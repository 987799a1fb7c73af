//! Error taxonomy shared by both chat backends.

use std::fmt;

use serde_json::Value;

use crate::Provider;

/// Standard User-Agent header for aidigest API requests.
pub const USER_AGENT: &str = concat!("aidigest/", env!("CARGO_PKG_VERSION"));

/// Categories of chat errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    /// Missing or invalid endpoint, key or model (raised before any I/O)
    Config,
    /// Non-2xx HTTP status
    HttpStatus,
    /// Network failure while sending or reading the body
    Transport,
    /// Wall-clock budget exceeded
    Timeout,
    /// Response body could not be decoded
    Parse,
    /// Prompt rejected by the provider
    PromptBlocked,
    /// Generation stopped by the safety filter
    Safety,
    /// Generation stopped for a reason other than STOP or SAFETY
    Finished,
    /// Error object returned inside a response or stream event
    Api,
    /// The call finished without producing any text
    Empty,
}

impl fmt::Display for ChatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatErrorKind::Config => "config",
            ChatErrorKind::HttpStatus => "http_status",
            ChatErrorKind::Transport => "transport",
            ChatErrorKind::Timeout => "timeout",
            ChatErrorKind::Parse => "parse",
            ChatErrorKind::PromptBlocked => "prompt_blocked",
            ChatErrorKind::Safety => "safety",
            ChatErrorKind::Finished => "finished",
            ChatErrorKind::Api => "api_error",
            ChatErrorKind::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Structured error from a chat call with kind and details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    /// Error category
    pub kind: ChatErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Config, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Timeout, message)
    }

    /// Creates an HTTP status error.
    ///
    /// Uses `error.message` from a JSON body when present, otherwise the raw
    /// body text.
    pub fn http_status(provider: Provider, status: u16, body: &str) -> Self {
        let extracted = serde_json::from_str::<Value>(body).ok().and_then(|json| {
            json.get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let message = match extracted {
            Some(msg) => msg,
            None if body.trim().is_empty() => format!("Unknown {provider} Chat API error"),
            None => body.to_string(),
        };
        Self {
            kind: ChatErrorKind::HttpStatus,
            message: format!("{provider} Chat API error ({status}): {message}"),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    /// Whether the error came from a content policy decision.
    pub fn is_content_policy(&self) -> bool {
        matches!(
            self.kind,
            ChatErrorKind::PromptBlocked | ChatErrorKind::Safety
        )
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ChatError {}

/// Result type for chat operations.
pub type ChatResult<T> = std::result::Result<T, ChatError>;

pub(crate) fn classify_reqwest_error(e: &reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ChatError::new(ChatErrorKind::Transport, format!("Connection failed: {e}"))
    } else if e.is_request() {
        ChatError::new(ChatErrorKind::Transport, format!("Request error: {e}"))
    } else {
        ChatError::new(ChatErrorKind::Transport, format!("Network error: {e}"))
    }
}

/// Renders safety ratings the way they appear in error messages.
pub(crate) fn format_safety_ratings(ratings: Option<&Value>) -> String {
    match ratings {
        Some(value) if !value.is_null() => value.to_string(),
        _ => "N/A".to_string(),
    }
}
