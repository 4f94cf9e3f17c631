//! One-shot workflow protocol.

pub mod encoder;
pub mod response_decoder;

use serde::Serialize;

/// Body posted to `{base_url}/workflows/{workflow_id}/runs`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRunRequest<'a> {
    pub workflow_id: &'a str,
    pub input: WorkflowInput<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowInput<'a> {
    /// The most recent user turn.
    pub text: &'a str,
    /// Trailing turns preceding `text`, oldest first.
    pub context: Vec<WorkflowTurn<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowTurn<'a> {
    pub role: &'static str,
    pub content: &'a str,
}
