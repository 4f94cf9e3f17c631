use futures_util::{stream, StreamExt};
use tokio::time::timeout_at;

use crate::error::{sanitize_upstream_error, RelayError};
use crate::protocol::canonical::NormalizedEvent;
use crate::protocol::workflow::encoder::encode_workflow_body;
use crate::protocol::workflow::response_decoder::{decode_workflow_response, pace_text};
use crate::transport::bearer_json_headers;

use super::context::RelayContext;
use super::AttemptStream;

fn workflow_runs_url(base_url: &str, workflow_id: &str) -> String {
    format!(
        "{}/workflows/{workflow_id}/runs",
        base_url.trim_end_matches('/')
    )
}

/// Run the workflow once and return its events, ending in `Done`.
///
/// The call is never retried and is bounded by the request deadline.
///
/// # Errors
///
/// Returns [`RelayError::UpstreamTimeout`] past the deadline and
/// [`RelayError::UpstreamFailure`] for a non-success status, a non-JSON
/// body, or a response without text.
pub async fn invoke(ctx: &RelayContext) -> Result<Vec<NormalizedEvent>, RelayError> {
    let credential = ctx.credential()?;
    let workflow = &ctx.config.workflow;
    let workflow_id = workflow
        .configured_id()
        .ok_or_else(|| RelayError::Config("WORKFLOW_ID is missing".to_string()))?;

    if ctx.deadline_passed() {
        return Err(ctx.timeout_error("workflow"));
    }

    let url = workflow_runs_url(ctx.config.workflow_base_url(), workflow_id);
    let body = encode_workflow_body(workflow_id, &ctx.request, workflow.context_turns)?;
    let headers = bearer_json_headers(credential, "application/json")?;

    tracing::debug!(request_id = %ctx.request_id, url = %url, "invoking workflow");

    let response = timeout_at(ctx.deadline, ctx.transport.post_json(&url, headers, body))
        .await
        .map_err(|_| ctx.timeout_error("workflow"))??;
    let status = response.status();
    let bytes = timeout_at(ctx.deadline, response.bytes())
        .await
        .map_err(|_| ctx.timeout_error("workflow"))?
        .map_err(|err| RelayError::UpstreamFailure(format!("Failed to read workflow response: {err}")))?;

    if !status.is_success() {
        return Err(RelayError::UpstreamFailure(format!(
            "Workflow returned {}: {}",
            status.as_u16(),
            sanitize_upstream_error(&bytes)
        )));
    }

    let payload: serde_json::Value = serde_json::from_slice(&bytes).map_err(|err| {
        RelayError::UpstreamFailure(format!("Workflow returned a non-JSON body: {err}"))
    })?;
    let text = decode_workflow_response(&payload)
        .and_then(|event| event.text)
        .ok_or_else(|| RelayError::UpstreamFailure("Workflow response carried no text".to_string()))?;
    tracing::debug!(request_id = %ctx.request_id, chars = text.chars().count(), "decoded workflow response");

    let mut events: Vec<NormalizedEvent> = pace_text(&text, workflow.emit_chunk_chars)
        .into_iter()
        .map(NormalizedEvent::content)
        .collect();
    events.push(NormalizedEvent::done());
    Ok(events)
}

/// Lazily started workflow attempt. Nothing is sent until the first pull.
#[must_use]
pub fn workflow_attempt(ctx: RelayContext) -> AttemptStream {
    Box::pin(
        stream::once(async move { invoke(&ctx).await }).flat_map(|result| {
            let items: Vec<Result<NormalizedEvent, RelayError>> = match result {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            stream::iter(items)
        }),
    )
}
