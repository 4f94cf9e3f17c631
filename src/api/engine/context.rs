use std::sync::Arc;

use tokio::time::Instant;

use crate::config::AppConfig;
use crate::error::RelayError;
use crate::protocol::canonical::ChatRequest;
use crate::state::AppState;
use crate::transport::HttpTransport;

/// Per-request values handed to each upstream attempt.
///
/// Built once at request entry from the immutable config; cloning shares
/// the config, the request and the connection pool.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub request_id: uuid::Uuid,
    pub config: Arc<AppConfig>,
    pub transport: HttpTransport,
    pub request: Arc<ChatRequest>,
    /// Single deadline covering primary and fallback together.
    pub deadline: Instant,
}

impl RelayContext {
    #[must_use]
    pub fn new(state: &AppState, request_id: uuid::Uuid, request: ChatRequest) -> Self {
        let deadline = Instant::now() + request.deadline;
        Self {
            request_id,
            config: Arc::clone(&state.config),
            transport: state.transport.clone(),
            request: Arc::new(request),
            deadline,
        }
    }

    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when no credential is configured.
    pub fn credential(&self) -> Result<&str, RelayError> {
        self.config
            .direct
            .credential()
            .ok_or_else(|| RelayError::Config("OPENAI_API_KEY is missing".to_string()))
    }

    #[must_use]
    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    #[must_use]
    pub fn timeout_error(&self, stage: &str) -> RelayError {
        RelayError::UpstreamTimeout(format!(
            "{stage} did not finish within the {}s request deadline",
            self.request.deadline.as_secs_f64()
        ))
    }
}
