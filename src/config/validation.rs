use super::{AppConfig, ConfigError};

const MAX_CONTEXT_TURNS: usize = 64;

/// Validate the full application config, returning an error if any rule is violated.
///
/// Credential and workflow id presence are deliberately not checked here;
/// the strategy selector reports them per request.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream_urls(config)?;
    validate_workflow_config(config)?;
    validate_generation_params(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.request_deadline_secs == 0 {
        return Err(validation_err(
            "server.request_deadline_secs must be greater than 0",
        ));
    }
    if server.connect_timeout_secs == 0 {
        return Err(validation_err(
            "server.connect_timeout_secs must be greater than 0",
        ));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_http_url(field_name: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(validation_err(format!(
            "{field_name} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_upstream_urls(config: &AppConfig) -> Result<(), ConfigError> {
    validate_http_url("direct.base_url", &config.direct.base_url)?;
    if let Some(base_url) = config.workflow.base_url.as_deref() {
        validate_http_url("workflow.base_url", base_url)?;
    }
    if config.direct.model.trim().is_empty() {
        return Err(validation_err("direct.model cannot be empty"));
    }
    Ok(())
}

fn validate_workflow_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.workflow.context_turns > MAX_CONTEXT_TURNS {
        return Err(validation_err(format!(
            "workflow.context_turns must be at most {MAX_CONTEXT_TURNS}"
        )));
    }
    Ok(())
}

fn validate_generation_params(config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(temperature) = config.direct.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(validation_err(
                "direct.temperature must be between 0.0 and 2.0",
            ));
        }
    }
    if config.direct.max_tokens == Some(0) {
        return Err(validation_err(
            "direct.max_tokens must be greater than 0 when set",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
