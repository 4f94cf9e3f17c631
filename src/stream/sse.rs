/// SSE line buffering for upstream bodies and frame encoding for the client.
///
/// Upstream bytes arrive in arbitrary fragments. [`LineBuffer`] keeps the
/// partial tail between reads and hands out only fully terminated lines.
use bytes::{Bytes, BytesMut};
use memchr::memchr;

use crate::protocol::canonical::{EventKind, NormalizedEvent};

/// Incremental `\n`-delimited line splitter.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: BytesMut,
    scan_from: usize,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
        }
    }

    /// Append one fragment read from the connection.
    pub fn push(&mut self, fragment: &[u8]) {
        self.buffer.extend_from_slice(fragment);
    }

    /// Next complete line without its `\n` (a trailing `\r` is kept).
    pub fn next_line(&mut self) -> Option<Bytes> {
        let Some(rel) = memchr(b'\n', &self.buffer[self.scan_from..]) else {
            self.scan_from = self.buffer.len();
            return None;
        };
        let line_end = self.scan_from + rel;
        let mut line = self.buffer.split_to(line_end + 1);
        line.truncate(line_end);
        self.scan_from = 0;
        Some(line.freeze())
    }

    /// Drain the unterminated tail at end of input, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scan_from = 0;
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.split().freeze())
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

fn data_frame(json: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(8 + json.len());
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(json);
    out.extend_from_slice(b"\n\n");
    Bytes::from(out)
}

/// `data: {"content":"<text>"}\n\n`
#[must_use]
pub fn content_frame(text: &str) -> Bytes {
    let json = serde_json::json!({ "content": text });
    data_frame(json.to_string().as_bytes())
}

/// `data: {"error":"<message>"}\n\n`
#[must_use]
pub fn error_frame(message: &str) -> Bytes {
    let json = serde_json::json!({ "error": message });
    data_frame(json.to_string().as_bytes())
}

/// Encode one normalized event as its client-facing SSE frame.
#[must_use]
pub fn event_frame(event: &NormalizedEvent) -> Bytes {
    match event.kind {
        EventKind::Content => content_frame(event.text.as_deref().unwrap_or_default()),
        EventKind::Done => Bytes::from_static(DONE_FRAME.as_bytes()),
        EventKind::Error => error_frame(event.detail.as_deref().unwrap_or("Upstream failure")),
    }
}
