//! Debounce loop
//!
//! Collects file events into the session's pending set and fires a
//! regeneration once no event has arrived for the debounce window. Each
//! regeneration runs as its own task, so events keep flowing (and the
//! deadline keeps resetting) while one is in flight.

use crate::session::{RegenOutcome, WatchSession};
use crate::watcher::FileEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};

/// What a debounce loop did before its event stream closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// File events received
    pub events: usize,

    /// Regenerations requested after a quiet period
    pub triggered: usize,

    /// Outcomes of the requested regenerations, in completion order
    pub outcomes: Vec<RegenOutcome>,
}

impl LoopSummary {
    fn record(&mut self, result: Result<RegenOutcome, JoinError>) {
        match result {
            Ok(outcome) => self.outcomes.push(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "Regeneration task failed");
                self.outcomes.push(RegenOutcome::Failed(e.to_string()));
            }
        }
    }
}

/// Run until `events` closes, then wait for in-flight regenerations.
///
/// A deadline still pending when the stream closes is flushed as one final
/// regeneration.
pub async fn run_debounce_loop(
    session: Arc<WatchSession>,
    mut events: UnboundedReceiver<FileEvent>,
    debounce: Duration,
) -> LoopSummary {
    let mut summary = LoopSummary::default();
    let mut tasks: JoinSet<RegenOutcome> = JoinSet::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Some(event) => {
                    tracing::debug!(path = %event.path, kind = ?event.kind, "Queued change");
                    session.record_change(&event.path).await;
                    summary.events += 1;
                    deadline = Some(Instant::now() + debounce);
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                summary.triggered += 1;
                spawn_regeneration(&mut tasks, &session);
            }
        }

        while let Some(result) = tasks.try_join_next() {
            summary.record(result);
        }
    }

    if deadline.is_some() {
        summary.triggered += 1;
        spawn_regeneration(&mut tasks, &session);
    }

    while let Some(result) = tasks.join_next().await {
        summary.record(result);
    }

    tracing::debug!(
        events = summary.events,
        triggered = summary.triggered,
        "Debounce loop stopped"
    );
    summary
}

fn spawn_regeneration(tasks: &mut JoinSet<RegenOutcome>, session: &Arc<WatchSession>) {
    let session = Arc::clone(session);
    tasks.spawn(async move { session.regenerate().await });
}
