use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use tokio::time::{timeout_at, Instant};

use crate::error::{sanitize_upstream_error, RelayError};
use crate::protocol::canonical::NormalizedEvent;
use crate::protocol::openai_chat::encoder::encode_openai_chat_body;
use crate::protocol::openai_chat::stream::{
    classify_direct_line, decode_direct_chunk, direct_chunk_error, DirectLine,
};
use crate::stream::LineBuffer;
use crate::transport::bearer_json_headers;

use super::context::RelayContext;
use super::AttemptStream;

/// Pull-based read pump over a streamed Chat Completions body.
///
/// Each call to [`DirectPump::next_event`] decodes buffered lines until one
/// yields an event, and reads the next fragment only when no complete line
/// is left. Dropping the pump drops the body and with it the connection.
pub struct DirectPump<E> {
    body: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    lines: LineBuffer,
    deadline: Instant,
    request_id: uuid::Uuid,
    eof: bool,
    finished: bool,
    skipped: usize,
}

impl<E: Display> DirectPump<E> {
    pub fn new<S>(body: S, deadline: Instant, request_id: uuid::Uuid) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    {
        Self {
            body: Box::pin(body),
            lines: LineBuffer::new(),
            deadline,
            request_id,
            eof: false,
            finished: false,
            skipped: 0,
        }
    }

    /// Malformed lines dropped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Next decoded item, or `None` once a terminal has been returned.
    pub async fn next_event(&mut self) -> Option<Result<NormalizedEvent, RelayError>> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(line) = self.lines.next_line() {
                if let Some(item) = self.decode_line(&line) {
                    return Some(item);
                }
                continue;
            }
            if self.eof {
                if let Some(tail) = self.lines.finish() {
                    if let Some(item) = self.decode_line(&tail) {
                        return Some(item);
                    }
                    continue;
                }
                // Connection closed without the sentinel.
                self.finished = true;
                return Some(Ok(NormalizedEvent::done()));
            }

            match timeout_at(self.deadline, self.body.next()).await {
                Err(_) => {
                    self.finished = true;
                    return Some(Err(RelayError::UpstreamTimeout(
                        "direct stream did not finish within the request deadline".to_string(),
                    )));
                }
                Ok(Some(Ok(fragment))) => self.lines.push(&fragment),
                Ok(Some(Err(err))) => {
                    self.finished = true;
                    return Some(Err(RelayError::UpstreamFailure(format!(
                        "Direct stream read failed: {err}"
                    ))));
                }
                Ok(None) => self.eof = true,
            }
        }
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Result<NormalizedEvent, RelayError>> {
        let Ok(line) = std::str::from_utf8(line) else {
            self.skip("line is not valid UTF-8");
            return None;
        };
        match classify_direct_line(line) {
            DirectLine::Ignored => None,
            DirectLine::Done => {
                self.finished = true;
                Some(Ok(NormalizedEvent::done()))
            }
            DirectLine::Chunk(chunk) => {
                if let Some(message) = direct_chunk_error(&chunk) {
                    self.finished = true;
                    return Some(Err(RelayError::UpstreamFailure(message)));
                }
                decode_direct_chunk(&chunk).map(Ok)
            }
            DirectLine::Malformed(reason) => {
                self.skip(&reason);
                None
            }
        }
    }

    fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        let err = RelayError::UpstreamProtocol(reason.to_string());
        tracing::warn!(
            request_id = %self.request_id,
            skipped = self.skipped,
            error = %err,
            "skipping malformed upstream chunk"
        );
    }
}

fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Open the streamed completion call and hand back its read pump.
///
/// # Errors
///
/// Returns [`RelayError::UpstreamTimeout`] past the deadline and
/// [`RelayError::UpstreamFailure`] when the call fails or answers with a
/// non-success status.
pub async fn open(ctx: &RelayContext) -> Result<DirectPump<reqwest::Error>, RelayError> {
    let credential = ctx.credential()?;
    if ctx.deadline_passed() {
        return Err(ctx.timeout_error("direct"));
    }

    let direct = &ctx.config.direct;
    let url = chat_completions_url(&direct.base_url);
    let body = encode_openai_chat_body(direct, &ctx.request.messages)?;
    let headers = bearer_json_headers(credential, "text/event-stream")?;

    tracing::debug!(request_id = %ctx.request_id, url = %url, model = %direct.model, "opening direct stream");

    let response = timeout_at(ctx.deadline, ctx.transport.post_json(&url, headers, body))
        .await
        .map_err(|_| ctx.timeout_error("direct"))??;

    let status = response.status();
    if !status.is_success() {
        let bytes = timeout_at(ctx.deadline, response.bytes())
            .await
            .map_err(|_| ctx.timeout_error("direct"))?
            .unwrap_or_default();
        return Err(RelayError::UpstreamFailure(format!(
            "Direct provider returned {}: {}",
            status.as_u16(),
            sanitize_upstream_error(&bytes)
        )));
    }

    Ok(DirectPump::new(
        response.bytes_stream(),
        ctx.deadline,
        ctx.request_id,
    ))
}

enum DirectPhase {
    Connect(RelayContext),
    Reading(DirectPump<reqwest::Error>),
    Finished,
}

/// Lazily started direct attempt. The connection opens on the first pull.
#[must_use]
pub fn direct_attempt(ctx: RelayContext) -> AttemptStream {
    Box::pin(stream::unfold(DirectPhase::Connect(ctx), |phase| async move {
        let mut pump = match phase {
            DirectPhase::Connect(ctx) => match open(&ctx).await {
                Ok(pump) => pump,
                Err(err) => return Some((Err(err), DirectPhase::Finished)),
            },
            DirectPhase::Reading(pump) => pump,
            DirectPhase::Finished => return None,
        };
        let item = pump.next_event().await?;
        Some((item, DirectPhase::Reading(pump)))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::EventKind;
    use std::convert::Infallible;
    use std::time::Duration;

    fn pump_over(fragments: Vec<&'static [u8]>) -> DirectPump<Infallible> {
        let body = stream::iter(
            fragments
                .into_iter()
                .map(|fragment| Ok::<Bytes, Infallible>(Bytes::from_static(fragment))),
        );
        DirectPump::new(
            body,
            Instant::now() + Duration::from_secs(5),
            uuid::Uuid::nil(),
        )
    }

    async fn drain<E: Display>(mut pump: DirectPump<E>) -> Vec<Result<NormalizedEvent, RelayError>> {
        let mut items = Vec::new();
        while let Some(item) = pump.next_event().await {
            items.push(item);
        }
        items
    }

    fn texts(items: &[Result<NormalizedEvent, RelayError>]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .filter_map(|event| event.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_deltas_then_sentinel() {
        let pump = pump_over(vec![
            b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            b"data: [DONE]\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n",
        ]);
        let items = drain(pump).await;
        assert_eq!(texts(&items), vec!["Hel", "lo"]);
        let last = items.last().unwrap().as_ref().unwrap();
        assert_eq!(last.kind, EventKind::Done);
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_lines_split_across_fragments() {
        let pump = pump_over(vec![
            b"data: {\"choices\":[{\"del",
            b"ta\":{\"content\":\"Hel\"}}]}\r",
            b"\n\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\r\n\r\nda",
            b"ta: [DONE]\r\n\r\n",
        ]);
        let items = drain(pump).await;
        assert_eq!(texts(&items), vec!["Hel", "lo"]);
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let mut pump = pump_over(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            b"data: {broken\n",
            b": keep-alive\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            b"data: [DONE]\n",
        ]);
        let mut items = Vec::new();
        while let Some(item) = pump.next_event().await {
            items.push(item);
        }
        assert_eq!(texts(&items), vec!["a", "b"]);
        assert_eq!(pump.skipped(), 1);
        assert!(items.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn test_close_without_sentinel_is_success() {
        let pump = pump_over(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\" tail\"}}]}",
        ]);
        let items = drain(pump).await;
        assert_eq!(texts(&items), vec!["partial", " tail"]);
        assert_eq!(
            items.last().unwrap().as_ref().unwrap().kind,
            EventKind::Done
        );
    }

    #[tokio::test]
    async fn test_in_band_error_is_failure() {
        let pump = pump_over(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            b"data: {\"error\":{\"message\":\"overloaded\"}}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        ]);
        let items = drain(pump).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items.last().unwrap(),
            Err(RelayError::UpstreamFailure(message)) if message == "overloaded"
        ));
    }

    #[tokio::test]
    async fn test_read_error_is_failure() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            )),
            Err("connection reset"),
        ]);
        let pump = DirectPump::new(
            body,
            Instant::now() + Duration::from_secs(5),
            uuid::Uuid::nil(),
        );
        let items = drain(pump).await;
        assert_eq!(texts(&items), vec!["a"]);
        assert!(matches!(
            items.last().unwrap(),
            Err(RelayError::UpstreamFailure(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_times_out() {
        let body = stream::iter(vec![Ok::<Bytes, Infallible>(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
        ))])
        .chain(stream::pending());
        let pump = DirectPump::new(
            body,
            Instant::now() + Duration::from_millis(200),
            uuid::Uuid::nil(),
        );
        let items = drain(pump).await;
        assert_eq!(texts(&items), vec!["a"]);
        assert!(matches!(
            items.last().unwrap(),
            Err(RelayError::UpstreamTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_decoding_is_deterministic() {
        let fragments: Vec<&'static [u8]> = vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
            b"data: nope\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\n",
        ];
        let first = texts(&drain(pump_over(fragments.clone())).await);
        let second = texts(&drain(pump_over(fragments)).await);
        assert_eq!(first, second);
        assert_eq!(first, vec!["x", "y"]);
    }

    #[test]
    fn test_chat_completions_url() {
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
