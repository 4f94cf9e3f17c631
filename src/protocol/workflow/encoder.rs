use crate::error::RelayError;
use crate::protocol::canonical::ChatRequest;

use super::{WorkflowInput, WorkflowRunRequest, WorkflowTurn};

/// Build the run request: the latest user turn plus up to `context_turns`
/// turns that precede it. The oldest turns are dropped first.
#[must_use]
pub fn build_workflow_run_request<'a>(
    workflow_id: &'a str,
    request: &'a ChatRequest,
    context_turns: usize,
) -> WorkflowRunRequest<'a> {
    let latest = request.latest_user_index();
    let text = request
        .messages
        .get(latest)
        .map_or("", |message| message.content.as_str());
    let preceding = &request.messages[..latest.min(request.messages.len())];
    let window_start = preceding.len().saturating_sub(context_turns);
    let context = preceding[window_start..]
        .iter()
        .map(|message| WorkflowTurn {
            role: message.role.as_str(),
            content: &message.content,
        })
        .collect();

    WorkflowRunRequest {
        workflow_id,
        input: WorkflowInput { text, context },
    }
}

/// Serialize the workflow run request body.
///
/// # Errors
///
/// Returns [`RelayError::UpstreamFailure`] if serialization fails.
pub fn encode_workflow_body(
    workflow_id: &str,
    request: &ChatRequest,
    context_turns: usize,
) -> Result<bytes::Bytes, RelayError> {
    let run = build_workflow_run_request(workflow_id, request, context_turns);
    serde_json::to_vec(&run)
        .map(bytes::Bytes::from)
        .map_err(|e| RelayError::UpstreamFailure(format!("Failed to encode workflow request: {e}")))
}
