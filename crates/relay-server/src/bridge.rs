//! Background tasks between the operator transport and the coordinator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use relay_core::{OperatorMessage, RelayCoordinator, ReplyOutcome};

use crate::metrics::{RELAY_CORRELATIONS_EVICTED_TOTAL, RELAY_REPLIES_TOTAL};

/// Feed every operator message into the coordinator, in arrival order.
pub fn spawn_reply_consumer(
    coordinator: Arc<RelayCoordinator>,
    mut rx: mpsc::Receiver<OperatorMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => {
                        info!("operator message channel closed");
                        break;
                    }
                },
            };
            let outcome = coordinator.handle_operator_message(&message);
            metrics::counter!(RELAY_REPLIES_TOTAL, "outcome" => outcome_label(&outcome)).increment(1);
        }
    })
}

fn outcome_label(outcome: &ReplyOutcome) -> &'static str {
    match outcome {
        ReplyOutcome::Delivered { .. } => "delivered",
        ReplyOutcome::Buffered { .. } => "buffered",
        ReplyOutcome::Ignored(reason) => reason.as_str(),
    }
}

/// Run [`RelayCoordinator::evict_expired_correlations`] every `every`.
pub fn spawn_correlation_sweeper(
    coordinator: Arc<RelayCoordinator>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = coordinator.evict_expired_correlations();
                    if evicted > 0 {
                        metrics::counter!(RELAY_CORRELATIONS_EVICTED_TOTAL).increment(evicted as u64);
                        debug!(evicted, remaining = coordinator.correlator().len(), "swept correlations");
                    }
                }
            }
        }
    })
}
