//! `POST /api/chat`: validate, pick a strategy, relay, emit.

pub(crate) mod parse;

use std::sync::Arc;
use std::time::Instant;

use axum::response::{IntoResponse, Response};

use crate::api::common::{handle_non_streaming_response, handle_streaming_response};
use crate::api::engine::context::RelayContext;
use crate::api::engine::direct::direct_attempt;
use crate::api::engine::fallback::relay_events;
use crate::api::engine::workflow::workflow_attempt;
use crate::api::engine::AttemptStream;
use crate::error::RelayError;
use crate::observability::RequestLog;
use crate::routing::{select_strategy, Availability, Strategy};
use crate::state::AppState;

use self::parse::parse_chat_request;

fn open_attempt(ctx: &RelayContext, strategy: Strategy) -> AttemptStream {
    match strategy {
        Strategy::Workflow => workflow_attempt(ctx.clone()),
        Strategy::Direct => direct_attempt(ctx.clone()),
    }
}

pub async fn handler(state: Arc<AppState>, method: http::Method, body: bytes::Bytes) -> Response {
    let started = Instant::now();
    let request_id = state.next_request_id();
    match handler_inner(&state, request_id, started, &method, &body).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                RelayError::Config(detail) => {
                    tracing::error!(request_id = %request_id, error = %detail, "chat request rejected");
                }
                other => {
                    tracing::debug!(request_id = %request_id, error = %other, "chat request rejected");
                }
            }
            err.into_response()
        }
    }
}

async fn handler_inner(
    state: &AppState,
    request_id: uuid::Uuid,
    started: Instant,
    method: &http::Method,
    body: &[u8],
) -> Result<Response, RelayError> {
    let request = parse_chat_request(method, body, state.config.server.request_deadline())?;
    let plan = select_strategy(request.mode, Availability::from_config(&state.config))?;

    tracing::debug!(
        request_id = %request_id,
        mode = %request.mode,
        plan = %plan,
        stream = request.stream,
        turns = request.messages.len(),
        "chat request accepted"
    );

    let stream = request.stream;
    let ctx = RelayContext::new(state, request_id, request);
    let events = relay_events(request_id, plan, move |strategy| open_attempt(&ctx, strategy));
    let log = RequestLog::new(request_id, plan, started);

    let response = if stream {
        handle_streaming_response(events, log).await
    } else {
        handle_non_streaming_response(events, log).await
    };
    Ok(response)
}
