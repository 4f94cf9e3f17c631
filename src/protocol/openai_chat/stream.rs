use crate::error::sanitize_upstream_error;
use crate::protocol::canonical::NormalizedEvent;

use super::OpenAiStreamChunk;

const DONE_SENTINEL: &str = "[DONE]";

/// What one complete upstream line means to the read pump.
#[derive(Debug)]
pub enum DirectLine {
    /// Blank lines, SSE comments and non-`data` fields.
    Ignored,
    /// The `[DONE]` sentinel.
    Done,
    Chunk(OpenAiStreamChunk),
    /// A `data:` payload that is neither JSON nor the sentinel.
    Malformed(String),
}

/// Classify a single line (without its terminator) from the streamed body.
#[must_use]
pub fn classify_direct_line(line: &str) -> DirectLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix("data:") else {
        return DirectLine::Ignored;
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return DirectLine::Ignored;
    }
    if payload == DONE_SENTINEL {
        return DirectLine::Done;
    }
    match serde_json::from_str::<OpenAiStreamChunk>(payload) {
        Ok(chunk) => DirectLine::Chunk(chunk),
        Err(err) => DirectLine::Malformed(err.to_string()),
    }
}

/// Direct-shape decoder: incremental text from `choices[0].delta.content`.
///
/// Absent or empty text yields no event.
#[must_use]
pub fn decode_direct_chunk(chunk: &OpenAiStreamChunk) -> Option<NormalizedEvent> {
    let text = chunk.choices.first()?.delta.content.as_deref()?;
    if text.is_empty() {
        return None;
    }
    Some(NormalizedEvent::content(text))
}

/// Message of an in-band `{"error": ...}` chunk, if the chunk is one.
#[must_use]
pub fn direct_chunk_error(chunk: &OpenAiStreamChunk) -> Option<String> {
    let error = chunk.error.as_ref()?;
    if error.is_null() {
        return None;
    }
    let wrapped = serde_json::json!({ "error": error });
    Some(sanitize_upstream_error(wrapped.to_string().as_bytes()))
}
