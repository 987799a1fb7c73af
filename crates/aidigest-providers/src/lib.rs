//! Chat-completion clients for Gemini and OpenAI-style APIs.
//!
//! The streaming side is built around [`StreamDecoder`], which turns an
//! SSE byte stream into text fragments, and [`FragmentStream`], which adapts
//! it to a `futures` stream over a reqwest response body.

use std::fmt;

pub mod client;
pub mod gemini;
pub mod openai;
pub mod shared;
pub mod sse;
pub mod stream;

pub use client::{ChatClient, ChatConfig, ChatStream, DEFAULT_TIMEOUT, collect_text};
pub use shared::{ChatError, ChatErrorKind, ChatResult, USER_AGENT};
pub use stream::{FragmentStream, StreamDecoder};

/// Wire shape of the chat-completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Gemini,
    OpenAI,
}

impl Provider {
    /// Selects a provider from a platform setting.
    ///
    /// Any value starting with `OPEN` (case-insensitive) selects `OpenAI`;
    /// everything else falls back to Gemini.
    pub fn from_platform(platform: &str) -> Self {
        let upper = platform.trim().to_ascii_uppercase();
        if upper.starts_with("OPEN") {
            Self::OpenAI
        } else {
            Self::Gemini
        }
    }

    /// Human-readable name used in error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenAI => "OpenAI",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
