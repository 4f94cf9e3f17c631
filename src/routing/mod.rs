//! Upstream strategy selection.

pub mod dispatch;

use std::fmt;

use crate::config::AppConfig;
use crate::error::RelayError;
use crate::protocol::canonical::RelayMode;
use crate::transport::bearer_header;

/// One of the two interchangeable upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Workflow,
    Direct,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Workflow => write!(f, "workflow"),
            Strategy::Direct => write!(f, "direct"),
        }
    }
}

/// Primary strategy plus at most one fallback hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyPlan {
    pub primary: Strategy,
    pub fallback: Option<Strategy>,
}

impl fmt::Display for StrategyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fallback {
            Some(fallback) => write!(f, "{}->{}", self.primary, fallback),
            None => write!(f, "{}", self.primary),
        }
    }
}

/// State of the provider credential shared by both strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Missing,
    /// Present but unusable as an `Authorization` header value.
    Malformed,
    Usable,
}

impl CredentialStatus {
    #[must_use]
    pub fn of(credential: Option<&str>) -> Self {
        match credential {
            None => CredentialStatus::Missing,
            Some(key) if bearer_header(key).is_err() => CredentialStatus::Malformed,
            Some(_) => CredentialStatus::Usable,
        }
    }
}

/// Process-wide availability flags read from the immutable config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub workflow_configured: bool,
    pub credential: CredentialStatus,
}

impl Availability {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            workflow_configured: config.workflow.configured_id().is_some(),
            credential: CredentialStatus::of(config.direct.credential()),
        }
    }
}

/// Pick the upstream plan for a request.
///
/// A workflow request without a configured workflow goes straight to the
/// direct provider with no fallback, so it never degrades twice.
///
/// # Errors
///
/// Returns [`RelayError::Config`] when the credential is missing or cannot
/// be sent, before any upstream is contacted.
pub fn select_strategy(
    mode: RelayMode,
    availability: Availability,
) -> Result<StrategyPlan, RelayError> {
    match availability.credential {
        CredentialStatus::Usable => {}
        CredentialStatus::Missing => {
            return Err(RelayError::Config("OPENAI_API_KEY is missing".to_string()));
        }
        CredentialStatus::Malformed => {
            return Err(RelayError::Config(
                "OPENAI_API_KEY is not a valid header value".to_string(),
            ));
        }
    }

    let plan = match mode {
        RelayMode::Workflow if availability.workflow_configured => StrategyPlan {
            primary: Strategy::Workflow,
            fallback: Some(Strategy::Direct),
        },
        RelayMode::Workflow | RelayMode::Direct => StrategyPlan {
            primary: Strategy::Direct,
            fallback: None,
        },
    };
    Ok(plan)
}
