//! Line framing for SSE-style chat streams.
//!
//! Events are split on every `\n` at the byte level. A multi-byte UTF-8
//! sequence never contains `\n`, so a complete line is always complete
//! UTF-8 regardless of where the network split the body.
//!
//! Blank lines are not treated as event boundaries: each `data:` line is
//! decoded on its own and multi-line `data:` events are not joined. Both
//! backends send one JSON payload per line.

/// Incremental line splitter over raw body bytes.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Drains whatever is left after the body ended.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Extracts the JSON payload of one framed line.
///
/// Strips an optional `data:` prefix and surrounding whitespace. Returns
/// `None` for blank lines, the `[DONE]` sentinel and non-data SSE fields
/// (`event:`, `id:`, `retry:`, comments).
pub fn event_payload(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| trimmed.starts_with(field))
    {
        return None;
    }

    let body = trimmed.strip_prefix("data:").unwrap_or(trimmed).trim();
    if body.is_empty() || body == "[DONE]" {
        None
    } else {
        Some(body)
    }
}
