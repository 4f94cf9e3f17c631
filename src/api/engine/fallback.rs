//! Fallback coordinator.
//!
//! Runs the primary attempt and, when it fails and the plan allows, the
//! fallback exactly once. An attempt that still has a fallback behind it is
//! buffered to completion so its failure never reaches the client; the
//! final attempt is forwarded live. A configuration failure is never
//! retried on the fallback.

use futures_util::{stream, Stream, StreamExt};

use crate::protocol::canonical::{ErrorKind, EventKind, NormalizedEvent, StrategyOutcome};
use crate::routing::{Strategy, StrategyPlan};

use super::AttemptStream;

/// Run one attempt to completion.
pub async fn collect_outcome(mut attempt: AttemptStream) -> StrategyOutcome {
    let mut events = Vec::new();
    while let Some(item) = attempt.next().await {
        match item {
            Ok(event) if event.kind == EventKind::Error => {
                let detail = event.detail.unwrap_or_default();
                return StrategyOutcome::failure(ErrorKind::UpstreamFailure, detail);
            }
            Ok(event) if event.is_terminal() => return StrategyOutcome::success(events),
            Ok(event) => events.push(event),
            Err(err) => return StrategyOutcome::failure(err.kind(), err.client_message()),
        }
    }
    StrategyOutcome::success(events)
}

enum Phase<F> {
    Start {
        request_id: uuid::Uuid,
        plan: StrategyPlan,
        open: F,
    },
    Live(AttemptStream),
    Replay(std::vec::IntoIter<NormalizedEvent>),
    Finished,
}

/// Sequence the plan's attempts into one client-facing event stream.
///
/// The output is zero or more `Content` events followed by exactly one
/// terminal, whatever the attempts do.
pub fn relay_events<F>(
    request_id: uuid::Uuid,
    plan: StrategyPlan,
    open: F,
) -> impl Stream<Item = NormalizedEvent> + Send
where
    F: FnMut(Strategy) -> AttemptStream + Send + 'static,
{
    let start = Phase::Start {
        request_id,
        plan,
        open,
    };
    stream::unfold(start, |phase| async move {
        let mut phase = phase;
        loop {
            match phase {
                Phase::Start {
                    request_id,
                    plan,
                    mut open,
                } => {
                    let Some(fallback) = plan.fallback else {
                        phase = Phase::Live(open(plan.primary));
                        continue;
                    };
                    let outcome = collect_outcome(open(plan.primary)).await;
                    if outcome.succeeded || outcome.failure_reason == Some(ErrorKind::Config) {
                        phase = Phase::Replay(outcome.events.into_iter());
                        continue;
                    }
                    tracing::warn!(
                        request_id = %request_id,
                        primary = %plan.primary,
                        fallback = %fallback,
                        reason = ?outcome.failure_reason,
                        detail = outcome.events.first().and_then(|e| e.detail.as_deref()).unwrap_or_default(),
                        "primary attempt failed, falling back"
                    );
                    phase = Phase::Live(open(fallback));
                }
                Phase::Live(mut attempt) => {
                    return Some(match attempt.next().await {
                        Some(Ok(event)) if event.is_terminal() => (event, Phase::Finished),
                        Some(Ok(event)) => (event, Phase::Live(attempt)),
                        Some(Err(err)) => (NormalizedEvent::error(err.client_message()), Phase::Finished),
                        None => (NormalizedEvent::done(), Phase::Finished),
                    });
                }
                Phase::Replay(mut events) => {
                    let event = events.next()?;
                    let next = if event.is_terminal() {
                        Phase::Finished
                    } else {
                        Phase::Replay(events)
                    };
                    return Some((event, next));
                }
                Phase::Finished => return None,
            }
        }
    })
}
