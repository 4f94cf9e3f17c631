mod request_id;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers. Read-only after startup.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transport: HttpTransport,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Allocate the id used to correlate every log line of one request.
    #[must_use]
    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next_uuid()
    }
}
