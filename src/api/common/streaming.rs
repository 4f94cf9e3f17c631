use std::convert::Infallible;
use std::pin::Pin;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};

use crate::observability::RequestLog;
use crate::protocol::canonical::{EventKind, NormalizedEvent};
use crate::stream::event_frame;

/// Frame writer that accepts exactly one terminal event.
pub(crate) struct SseWriter {
    terminal_written: bool,
}

impl SseWriter {
    pub(crate) fn new() -> Self {
        Self {
            terminal_written: false,
        }
    }

    /// Encode the next event, or `None` once the terminal frame is out.
    pub(crate) fn frame(&mut self, event: &NormalizedEvent) -> Option<Bytes> {
        if self.terminal_written {
            debug_assert!(false, "event written after the terminal frame");
            return None;
        }
        self.terminal_written = event.is_terminal();
        Some(event_frame(event))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.terminal_written
    }
}

fn sse_response(status: http::StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

struct EmitState {
    pending: Option<NormalizedEvent>,
    events: Pin<Box<dyn Stream<Item = NormalizedEvent> + Send>>,
    writer: SseWriter,
    log: RequestLog,
}

/// Forward events to the client as SSE frames as soon as they arrive.
///
/// The first event decides the status: a leading terminal error becomes a
/// 502 carrying that single error frame, anything else streams under 200.
pub(crate) async fn handle_streaming_response<S>(events: S, mut log: RequestLog) -> Response
where
    S: Stream<Item = NormalizedEvent> + Send + 'static,
{
    let mut events: Pin<Box<dyn Stream<Item = NormalizedEvent> + Send>> = Box::pin(events);
    let first = events
        .next()
        .await
        .unwrap_or_else(|| NormalizedEvent::error("Upstream ended without a response"));

    if first.kind == EventKind::Error {
        log.observe(&first);
        return sse_response(
            http::StatusCode::BAD_GATEWAY,
            Body::from(event_frame(&first)),
        );
    }

    let state = EmitState {
        pending: Some(first),
        events,
        writer: SseWriter::new(),
        log,
    };
    let frames = stream::unfold(state, |mut state| async move {
        if state.writer.is_closed() {
            return None;
        }
        let event = match state.pending.take() {
            Some(event) => event,
            None => state
                .events
                .next()
                .await
                .unwrap_or_else(|| NormalizedEvent::error("Upstream ended without a response")),
        };
        state.log.observe(&event);
        let frame = state.writer.frame(&event)?;
        Some((frame, state))
    });

    sse_response(
        http::StatusCode::OK,
        Body::from_stream(frames.map(Ok::<Bytes, Infallible>)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Strategy, StrategyPlan};

    fn log() -> RequestLog {
        RequestLog::new(
            uuid::Uuid::nil(),
            StrategyPlan {
                primary: Strategy::Direct,
                fallback: None,
            },
            std::time::Instant::now(),
        )
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_streams_content_then_done() {
        let events = stream::iter(vec![
            NormalizedEvent::content("Hel"),
            NormalizedEvent::content("lo"),
            NormalizedEvent::done(),
        ]);
        let response = handle_streaming_response(events, log()).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(
            body_text(response).await,
            "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_leading_error_is_bad_gateway() {
        let events = stream::iter(vec![NormalizedEvent::error("down")]);
        let response = handle_streaming_response(events, log()).await;
        assert_eq!(response.status(), http::StatusCode::BAD_GATEWAY);
        assert_eq!(body_text(response).await, "data: {\"error\":\"down\"}\n\n");
    }

    #[tokio::test]
    async fn test_error_after_content_stays_in_band() {
        let events = stream::iter(vec![
            NormalizedEvent::content("par"),
            NormalizedEvent::error("timeout"),
        ]);
        let response = handle_streaming_response(events, log()).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            "data: {\"content\":\"par\"}\n\ndata: {\"error\":\"timeout\"}\n\n"
        );
    }

    #[tokio::test]
    async fn test_stream_without_terminal_gets_error_frame() {
        let events = stream::iter(vec![NormalizedEvent::content("x")]);
        let response = handle_streaming_response(events, log()).await;
        let text = body_text(response).await;
        assert!(text.ends_with("data: {\"error\":\"Upstream ended without a response\"}\n\n"));
    }

    #[test]
    fn test_writer_closes_after_terminal() {
        let mut writer = SseWriter::new();
        assert!(writer.frame(&NormalizedEvent::content("a")).is_some());
        assert!(!writer.is_closed());
        assert!(writer.frame(&NormalizedEvent::done()).is_some());
        assert!(writer.is_closed());
    }
}
