use axum::response::Json;
use serde_json::{json, Value};

use crate::routing::{Availability, CredentialStatus};
use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary that never includes secrets.
pub fn health_handler(state: &AppState) -> Json<Value> {
    let config = &state.config;
    let availability = Availability::from_config(config);
    Json(json!({
        "status": "allchat-relay is running",
        "config": {
            "credential_configured": availability.credential == CredentialStatus::Usable,
            "workflow_configured": availability.workflow_configured,
            "model": config.direct.model,
            "request_deadline_secs": config.server.request_deadline_secs,
            "log_level": config.features.log_level,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transport::HttpTransport;

    #[test]
    fn test_health_never_leaks_credential() {
        let mut config = AppConfig::default();
        config.direct.api_key = Some("sk-secret".to_string());
        let transport = HttpTransport::new(&config.server).unwrap();
        let state = AppState::new(config, transport);
        let Json(body) = health_handler(&state);
        assert_eq!(body["status"], "allchat-relay is running");
        assert_eq!(body["config"]["credential_configured"], true);
        assert_eq!(body["config"]["workflow_configured"], false);
        assert!(!body.to_string().contains("sk-secret"));
    }
}
