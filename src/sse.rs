//! Line assembly for server-sent-event response bodies.
//!
//! Response bytes arrive in arbitrary chunk boundaries; the buffer carries the
//! partial tail across chunks and hands back complete, trimmed lines.

use memchr::memchr;

/// Terminal sentinel the server sends as the final `data:` payload.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Appends a chunk and returns every complete line it closed off.
    /// Blank lines (event separators) are dropped; invalid UTF-8 lines are
    /// skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_index) = memchr(b'\n', &self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..=newline_index).collect();
            let mut end = raw.len() - 1;
            if end > 0 && raw[end - 1] == b'\r' {
                end -= 1;
            }
            if let Ok(text) = std::str::from_utf8(&raw[..end]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
        }
        lines
    }

    /// Flushes the unterminated tail, if any, when the body ends.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        let text = String::from_utf8(tail).ok()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Extracts the payload of a `data:` line, trimmed of surrounding whitespace.
/// Returns `None` for every other line (comments, separators).
pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}
