use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Role of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    #[must_use]
    pub fn from_wire(role: &str) -> Option<Self> {
        match role {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            "system" => Some(ChatRole::System),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// One validated conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Upstream strategy the client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RelayMode {
    #[default]
    Workflow,
    Direct,
}

impl RelayMode {
    /// Unknown or missing values fall back to [`RelayMode::Workflow`].
    #[must_use]
    pub fn from_wire(mode: Option<&str>) -> Self {
        match mode {
            Some("direct") => RelayMode::Direct,
            _ => RelayMode::Workflow,
        }
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMode::Workflow => write!(f, "workflow"),
            RelayMode::Direct => write!(f, "direct"),
        }
    }
}

/// A validated inbound chat request. Never mutated after validation.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub mode: RelayMode,
    pub stream: bool,
    pub deadline: Duration,
}

impl ChatRequest {
    /// Most recent user turn, or the last turn when the conversation has none.
    #[must_use]
    pub fn latest_user_index(&self) -> usize {
        self.messages
            .iter()
            .rposition(|message| message.role == ChatRole::User)
            .unwrap_or_else(|| self.messages.len().saturating_sub(1))
    }
}

/// Error taxonomy shared by every relay stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Config,
    UpstreamTimeout,
    UpstreamProtocol,
    UpstreamFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Config => "config",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamProtocol => "upstream_protocol",
            ErrorKind::UpstreamFailure => "upstream_failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Content,
    Done,
    Error,
}

/// Canonical unit consumed by the response emitters.
///
/// A well-formed sequence is zero or more `Content` events followed by
/// exactly one terminal (`Done` or `Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub kind: EventKind,
    pub text: Option<String>,
    pub detail: Option<String>,
}

impl NormalizedEvent {
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Content,
            text: Some(text.into()),
            detail: None,
        }
    }

    #[must_use]
    pub fn done() -> Self {
        Self {
            kind: EventKind::Done,
            text: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            text: None,
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Done | EventKind::Error)
    }
}

/// Result of one upstream attempt, seen only by the fallback coordinator.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub succeeded: bool,
    pub events: Vec<NormalizedEvent>,
    pub failure_reason: Option<ErrorKind>,
}

impl StrategyOutcome {
    #[must_use]
    pub fn success(mut events: Vec<NormalizedEvent>) -> Self {
        if !events.last().is_some_and(NormalizedEvent::is_terminal) {
            events.push(NormalizedEvent::done());
        }
        Self {
            succeeded: true,
            events,
            failure_reason: None,
        }
    }

    /// A failed attempt keeps only its terminal error; partial content is dropped.
    #[must_use]
    pub fn failure(reason: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            events: vec![NormalizedEvent::error(detail)],
            failure_reason: Some(reason),
        }
    }

    #[must_use]
    pub fn content_len(&self) -> usize {
        self.events
            .iter()
            .filter_map(|event| event.text.as_deref())
            .map(str::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults_to_workflow() {
        assert_eq!(RelayMode::from_wire(None), RelayMode::Workflow);
        assert_eq!(RelayMode::from_wire(Some("Direct")), RelayMode::Workflow);
        assert_eq!(RelayMode::from_wire(Some("bogus")), RelayMode::Workflow);
        assert_eq!(RelayMode::from_wire(Some("direct")), RelayMode::Direct);
    }

    #[test]
    fn test_latest_user_index_skips_trailing_assistant() {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::new(ChatRole::User, "a"),
                ChatMessage::new(ChatRole::User, "b"),
                ChatMessage::new(ChatRole::Assistant, "c"),
            ],
            mode: RelayMode::Workflow,
            stream: false,
            deadline: Duration::from_secs(30),
        };
        assert_eq!(request.latest_user_index(), 1);
    }

    #[test]
    fn test_latest_user_index_without_user_turn() {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::new(ChatRole::System, "s"),
                ChatMessage::new(ChatRole::Assistant, "a"),
            ],
            mode: RelayMode::Workflow,
            stream: false,
            deadline: Duration::from_secs(30),
        };
        assert_eq!(request.latest_user_index(), 1);
    }

    #[test]
    fn test_success_outcome_appends_single_done() {
        let outcome = StrategyOutcome::success(vec![NormalizedEvent::content("hi")]);
        assert!(outcome.succeeded);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[1].kind, EventKind::Done);

        let outcome = StrategyOutcome::success(vec![
            NormalizedEvent::content("hi"),
            NormalizedEvent::done(),
        ]);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.content_len(), 2);
    }

    #[test]
    fn test_failure_outcome_has_only_terminal_error() {
        let outcome = StrategyOutcome::failure(ErrorKind::UpstreamTimeout, "late");
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failure_reason, Some(ErrorKind::UpstreamTimeout));
        assert_eq!(outcome.events, vec![NormalizedEvent::error("late")]);
    }
}
