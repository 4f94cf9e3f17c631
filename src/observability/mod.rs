use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::protocol::canonical::{EventKind, NormalizedEvent};
use crate::routing::StrategyPlan;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Per-request tally written as one completion line.
///
/// Fed every event the emitter writes. A tally dropped before it saw a
/// terminal belongs to a client that went away mid-stream.
pub struct RequestLog {
    request_id: uuid::Uuid,
    plan: StrategyPlan,
    started: Instant,
    content_bytes: usize,
    outcome: Option<&'static str>,
}

impl RequestLog {
    #[must_use]
    pub fn new(request_id: uuid::Uuid, plan: StrategyPlan, started: Instant) -> Self {
        Self {
            request_id,
            plan,
            started,
            content_bytes: 0,
            outcome: None,
        }
    }

    pub fn observe(&mut self, event: &NormalizedEvent) {
        match event.kind {
            EventKind::Content => {
                self.content_bytes += event.text.as_deref().map_or(0, str::len);
            }
            EventKind::Done => self.finish("success"),
            EventKind::Error => self.finish("failure"),
        }
    }

    #[must_use]
    pub fn content_bytes(&self) -> usize {
        self.content_bytes
    }

    fn finish(&mut self, outcome: &'static str) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(outcome);
        tracing::info!(
            request_id = %self.request_id,
            plan = %self.plan,
            outcome,
            content_bytes = self.content_bytes,
            elapsed_ms = self.started.elapsed().as_millis(),
            "chat request complete"
        );
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.finish("client_disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Strategy;

    #[test]
    fn test_level_mapping() {
        assert_eq!(tracing_directive("DISABLED"), None);
        assert_eq!(tracing_directive("warning").as_deref(), Some("WARN"));
        assert_eq!(tracing_directive("CRITICAL").as_deref(), Some("ERROR"));
        assert_eq!(tracing_directive("debug").as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_request_log_counts_content() {
        let plan = StrategyPlan {
            primary: Strategy::Direct,
            fallback: None,
        };
        let mut log = RequestLog::new(uuid::Uuid::nil(), plan, Instant::now());
        log.observe(&NormalizedEvent::content("Hel"));
        log.observe(&NormalizedEvent::content("lo"));
        log.observe(&NormalizedEvent::done());
        assert_eq!(log.content_bytes(), 5);
        assert_eq!(log.outcome, Some("success"));
        log.observe(&NormalizedEvent::error("late"));
        assert_eq!(log.outcome, Some("success"));
    }
}
