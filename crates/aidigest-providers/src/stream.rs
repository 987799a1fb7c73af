//! Incremental decoder from SSE body bytes to text fragments.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::Stream;
use serde_json::Value;
use tracing::{debug, warn};

use crate::Provider;
use crate::gemini::GeminiDecoder;
use crate::openai::OpenAIDecoder;
use crate::shared::{ChatError, ChatErrorKind, ChatResult};
use crate::sse::{LineFramer, event_payload};

/// Provider-specific event interpretation.
#[derive(Debug)]
enum ProviderDecoder {
    Gemini(GeminiDecoder),
    OpenAI(OpenAIDecoder),
}

impl ProviderDecoder {
    fn decode_event(&mut self, event: &Value) -> ChatResult<Option<String>> {
        match self {
            Self::Gemini(decoder) => decoder.decode_event(event),
            Self::OpenAI(decoder) => decoder.decode_event(event),
        }
    }

    fn finish(&self) -> ChatResult<()> {
        match self {
            Self::Gemini(decoder) => decoder.finish(),
            Self::OpenAI(decoder) => decoder.finish(),
        }
    }
}

/// Turns raw SSE bytes into text fragments.
///
/// Bytes are fed with [`feed`](Self::feed) in whatever chunks the network
/// delivers, then [`finish`](Self::finish) is called once. Results are
/// drained with [`next_item`](Self::next_item). The first error ends the
/// stream: nothing is queued after it.
#[derive(Debug)]
pub struct StreamDecoder {
    provider: Provider,
    framer: LineFramer,
    decoder: ProviderDecoder,
    pending: VecDeque<ChatResult<String>>,
    failed: bool,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(provider: Provider) -> Self {
        let decoder = match provider {
            Provider::Gemini => ProviderDecoder::Gemini(GeminiDecoder::new()),
            Provider::OpenAI => ProviderDecoder::OpenAI(OpenAIDecoder::new()),
        };
        Self {
            provider,
            framer: LineFramer::new(),
            decoder,
            pending: VecDeque::new(),
            failed: false,
            finished: false,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Appends a body chunk and decodes every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.is_done() {
            return;
        }
        for line in self.framer.push(chunk) {
            self.handle_line(&line);
            if self.failed {
                return;
            }
        }
    }

    /// Flushes the trailing partial event and runs the end-of-stream check.
    ///
    /// Calling it more than once has no further effect.
    pub fn finish(&mut self) {
        if self.is_done() {
            return;
        }
        self.finished = true;

        if let Some(rest) = self.framer.flush() {
            self.handle_line(&rest);
        }
        if !self.failed
            && let Err(err) = self.decoder.finish()
        {
            warn!(provider = %self.provider, "{}", err.message);
            self.fail(err);
        }
    }

    /// Pops the next decoded fragment or terminal error.
    pub fn next_item(&mut self) -> Option<ChatResult<String>> {
        self.pending.pop_front()
    }

    /// Records a failure coming from outside the decoder (e.g. the body read).
    pub fn fail(&mut self, err: ChatError) {
        if self.failed {
            return;
        }
        self.failed = true;
        self.pending.push_back(Err(err));
    }

    fn is_done(&self) -> bool {
        self.failed || self.finished
    }

    fn handle_line(&mut self, line: &str) {
        let Some(payload) = event_payload(line) else {
            return;
        };

        let event = match serde_json::from_str::<Value>(payload) {
            Ok(event) => event,
            Err(err) => {
                match self.provider {
                    Provider::Gemini => {
                        warn!(error = %err, payload, "Skipping unparsable Gemini stream event");
                    }
                    Provider::OpenAI => {
                        debug!(error = %err, payload, "Skipping incomplete OpenAI stream event");
                    }
                }
                return;
            }
        };

        match self.decoder.decode_event(&event) {
            Ok(Some(fragment)) => self.pending.push_back(Ok(fragment)),
            Ok(None) => {}
            Err(err) => self.fail(err),
        }
    }
}

/// Stream of text fragments over a response body.
///
/// Each item is one fragment in arrival order; the stream ends after the
/// first error.
pub struct FragmentStream<S> {
    inner: S,
    decoder: StreamDecoder,
    inner_done: bool,
}

impl<S> FragmentStream<S> {
    pub fn new(inner: S, provider: Provider) -> Self {
        Self {
            inner,
            decoder: StreamDecoder::new(provider),
            inner_done: false,
        }
    }
}

impl<S, E> Stream for FragmentStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: Into<BodyError>,
{
    type Item = ChatResult<String>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            if let Some(item) = self.decoder.next_item() {
                return Poll::Ready(Some(item));
            }
            if self.inner_done {
                return Poll::Ready(None);
            }

            let inner = Pin::new(&mut self.inner);
            match inner.poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.decoder.feed(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    let err: BodyError = err.into();
                    self.inner_done = true;
                    self.decoder.fail(err.into_chat_error());
                }
                Poll::Ready(None) => {
                    self.inner_done = true;
                    self.decoder.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Failure while reading the response body.
#[derive(Debug)]
pub struct BodyError {
    timed_out: bool,
    message: String,
}

impl BodyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timed_out: false,
            message: message.into(),
        }
    }

    fn into_chat_error(self) -> ChatError {
        if self.timed_out {
            ChatError::timeout(format!("Response body timed out: {}", self.message))
        } else {
            ChatError::new(
                ChatErrorKind::Transport,
                format!("Failed to read response body: {}", self.message),
            )
        }
    }
}

impl From<reqwest::Error> for BodyError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BodyError {
    fn from(err: std::io::Error) -> Self {
        Self {
            timed_out: err.kind() == std::io::ErrorKind::TimedOut,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use serde_json::json;

    use super::*;

    fn sse(events: &[Value]) -> String {
        let mut body = String::new();
        for event in events {
            body.push_str("data: ");
            body.push_str(&event.to_string());
            body.push_str("\n\n");
        }
        body
    }

    fn decode_chunks(provider: Provider, chunks: &[&[u8]]) -> Vec<ChatResult<String>> {
        let mut decoder = StreamDecoder::new(provider);
        for chunk in chunks {
            decoder.feed(chunk);
        }
        decoder.finish();
        std::iter::from_fn(|| decoder.next_item()).collect()
    }

    fn gemini_text(text: &str) -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]})
    }

    /// Test: OpenAI deltas "Hel" + "lo" then [DONE] yield exactly two fragments.
    #[test]
    fn test_openai_fragments_in_order() {
        let mut body = sse(&[
            json!({"choices": [{"delta": {"content": "Hel"}}]}),
            json!({"choices": [{"delta": {"content": "lo"}}]}),
        ]);
        body.push_str("data: [DONE]\n\n");

        let items = decode_chunks(Provider::OpenAI, &[body.as_bytes()]);
        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    /// Test: every split point (including inside multi-byte characters and
    /// JSON objects) yields the same fragments as a single chunk.
    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let body = sse(&[
            gemini_text("你好，"),
            gemini_text("世界 🌏"),
            json!({"candidates": [{"content": {"parts": [{"text": "!"}]}, "finishReason": "STOP"}]}),
        ]);
        let bytes = body.as_bytes();
        let whole = decode_chunks(Provider::Gemini, &[bytes]);
        assert_eq!(
            whole,
            vec![
                Ok("你好，".to_string()),
                Ok("世界 🌏".to_string()),
                Ok("!".to_string())
            ]
        );

        for split in 1..bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_chunks(Provider::Gemini, &[a, b]), whole, "split at {split}");
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_chunks(Provider::Gemini, &singles), whole);
    }

    /// Test: the same invariance holds without `data:` prefixes or a
    /// trailing newline (last event flushed at end of stream).
    #[test]
    fn test_unprefixed_lines_and_trailing_flush() {
        let body = "{\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n{\"choices\":[{\"delta\":{\"content\":\"b\"}}]}";
        let whole = decode_chunks(Provider::OpenAI, &[body.as_bytes()]);
        assert_eq!(whole, vec![Ok("a".to_string()), Ok("b".to_string())]);

        for split in 1..body.len() {
            let (a, b) = body.as_bytes().split_at(split);
            assert_eq!(decode_chunks(Provider::OpenAI, &[a, b]), whole);
        }
    }

    /// Test: SAFETY stops the stream and emits nothing from that event.
    #[test]
    fn test_gemini_safety_is_terminal() {
        let body = sse(&[
            gemini_text("ok "),
            json!({"candidates": [{"content": {"parts": [{"text": "bad"}]}, "finishReason": "SAFETY"}]}),
            gemini_text("never"),
        ]);
        let items = decode_chunks(Provider::Gemini, &[body.as_bytes()]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("ok ".to_string()));
        let err = items[1].clone().unwrap_err();
        assert_eq!(err.kind, ChatErrorKind::Safety);
    }

    /// Test: a stream with no content and no finish reason fails.
    #[test]
    fn test_gemini_empty_stream_fails() {
        let items = decode_chunks(Provider::Gemini, &[b"data: {\"usageMetadata\":{}}\n\n"]);
        assert_eq!(items.len(), 1);
        let err = items[0].clone().unwrap_err();
        assert_eq!(err.kind, ChatErrorKind::Empty);
        assert_eq!(err.message, "Gemini Chat stream completed without yielding any content.");

        let items = decode_chunks(Provider::OpenAI, &[]);
        assert_eq!(
            items[0].clone().unwrap_err().message,
            "OpenAI Chat stream completed but yielded no content."
        );
    }

    #[test]
    fn test_invalid_json_is_skipped() {
        let body = "data: {not json}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n";
        assert_eq!(
            decode_chunks(Provider::OpenAI, &[body.as_bytes()]),
            vec![Ok("x".to_string())]
        );
        let body = format!("data: [oops\n\n{}", sse(&[gemini_text("y")]));
        assert_eq!(
            decode_chunks(Provider::Gemini, &[body.as_bytes()]),
            vec![Ok("y".to_string())]
        );
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut decoder = StreamDecoder::new(Provider::OpenAI);
        decoder.finish();
        decoder.finish();
        assert!(decoder.next_item().is_some_and(|item| item.is_err()));
        assert!(decoder.next_item().is_none());
    }

    #[tokio::test]
    async fn test_fragment_stream_over_byte_chunks() {
        let body = sse(&[
            json!({"choices": [{"delta": {"content": "Hel"}}]}),
            json!({"choices": [{"delta": {"content": "lo"}}]}),
        ]);
        let (a, b) = body.as_bytes().split_at(17);
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(a)),
            Ok(Bytes::copy_from_slice(b)),
        ];
        let fragments: Vec<_> = FragmentStream::new(stream::iter(chunks), Provider::OpenAI)
            .collect()
            .await;
        assert_eq!(fragments, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_fragment_stream_body_error() {
        let chunks = vec![
            Ok(Bytes::from(sse(&[gemini_text("a")]))),
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow")),
        ];
        let items: Vec<_> = FragmentStream::new(stream::iter(chunks), Provider::Gemini)
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("a".to_string()));
        assert_eq!(items[1].clone().unwrap_err().kind, ChatErrorKind::Timeout);
    }
}
