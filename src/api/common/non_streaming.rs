use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};

use crate::error::error_payload;
use crate::observability::RequestLog;
use crate::protocol::canonical::{EventKind, NormalizedEvent};

#[inline]
fn ok_json_response(body: &serde_json::Value) -> Response {
    let mut response = Response::new(axum::body::Body::from(body.to_string()));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

/// Concatenate all content into one `{"response": ...}` body, or answer
/// 502 with the terminal error.
pub(crate) async fn handle_non_streaming_response<S>(events: S, mut log: RequestLog) -> Response
where
    S: Stream<Item = NormalizedEvent> + Send,
{
    let mut events = std::pin::pin!(events);
    let mut text = String::new();
    while let Some(event) = events.next().await {
        log.observe(&event);
        match event.kind {
            EventKind::Content => text.push_str(event.text.as_deref().unwrap_or_default()),
            EventKind::Done => break,
            EventKind::Error => {
                let message = event.detail.as_deref().unwrap_or("Upstream failure");
                return (
                    http::StatusCode::BAD_GATEWAY,
                    axum::Json(error_payload(message)),
                )
                    .into_response();
            }
        }
    }
    ok_json_response(&serde_json::json!({ "response": text }))
}
