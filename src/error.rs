use crate::protocol::canonical::ErrorKind;

/// Why an inbound request was rejected before reaching any upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    MethodNotAllowed,
    MalformedBody,
    InvalidMessages,
}

/// Relay error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid request: {message}")]
    Validation {
        failure: ValidationFailure,
        message: String,
    },
    #[error("Server configuration error: {0}")]
    Config(String),
    #[error("Upstream timed out: {0}")]
    UpstreamTimeout(String),
    #[error("Upstream protocol error: {0}")]
    UpstreamProtocol(String),
    #[error("Upstream error: {0}")]
    UpstreamFailure(String),
}

impl RelayError {
    #[must_use]
    pub fn method_not_allowed() -> Self {
        RelayError::Validation {
            failure: ValidationFailure::MethodNotAllowed,
            message: "Method Not Allowed".to_string(),
        }
    }

    #[must_use]
    pub fn malformed_body(message: impl Into<String>) -> Self {
        RelayError::Validation {
            failure: ValidationFailure::MalformedBody,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_messages(message: impl Into<String>) -> Self {
        RelayError::Validation {
            failure: ValidationFailure::InvalidMessages,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Validation { .. } => ErrorKind::Validation,
            RelayError::Config(_) => ErrorKind::Config,
            RelayError::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            RelayError::UpstreamProtocol(_) => ErrorKind::UpstreamProtocol,
            RelayError::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
        }
    }

    /// Text written to the client. Configuration details stay in the logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Validation { message, .. } => message.clone(),
            RelayError::Config(_) => "An internal server error occurred.".to_string(),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            RelayError::Validation {
                failure: ValidationFailure::MethodNotAllowed,
                ..
            } => http::StatusCode::METHOD_NOT_ALLOWED,
            RelayError::Validation { .. } => http::StatusCode::BAD_REQUEST,
            RelayError::Config(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UpstreamTimeout(_)
            | RelayError::UpstreamProtocol(_)
            | RelayError::UpstreamFailure(_) => http::StatusCode::BAD_GATEWAY,
        }
    }
}

/// `{"error": "<message>"}`, the only error body shape the relay writes.
#[must_use]
pub fn error_payload(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Pull a readable message out of an upstream error body.
///
/// Prefers `error.message`, then a string `error`, then the raw text,
/// truncated to 500 bytes on a char boundary.
#[must_use]
pub fn sanitize_upstream_error(body: &[u8]) -> String {
    const MAX_LEN: usize = 500;

    let message = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(json) => {
            let error = json.get("error");
            error
                .and_then(|e| e.get("message"))
                .and_then(serde_json::Value::as_str)
                .or_else(|| error.and_then(serde_json::Value::as_str))
                .map_or_else(|| json.to_string(), ToString::to_string)
        }
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };

    if message.len() <= MAX_LEN {
        return message;
    }
    let mut cut = MAX_LEN;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &message[..cut])
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (status, axum::Json(error_payload(&self.client_message()))).into_response()
    }
}
