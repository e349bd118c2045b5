//! Forward dispatch queue and worker pool.
//!
//! Producers (bus ingest, command handlers) hand results to a bounded
//! in-memory queue and move on; delivery workers drain the queue and run
//! the retry sequence off the ingestion path. The queue is intentionally
//! not persistent — fire-and-forget semantics survive the redesign.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::ControlResult;

use super::ResultForwarder;

/// Producer-side handle: non-blocking dispatch into the bounded queue.
#[derive(Clone)]
pub struct ForwardHandle {
    tx: mpsc::Sender<ControlResult>,
}

impl ForwardHandle {
    /// Enqueue a result for delivery. Never blocks: a full queue drops the
    /// result with a warning (downstream is slower than the line — shedding
    /// is the contract), a closed queue means workers already shut down.
    pub fn dispatch(&self, result: ControlResult) {
        match self.tx.try_send(result) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(result)) => {
                warn!(
                    line = %result.line_id,
                    "Forward queue full — dropping result"
                );
            }
            Err(mpsc::error::TrySendError::Closed(result)) => {
                warn!(
                    line = %result.line_id,
                    "Forward queue closed — dropping result"
                );
            }
        }
    }
}

/// Worker-side receiver. Clonable so several workers can drain one queue.
#[derive(Clone)]
pub struct ForwardReceiver {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ControlResult>>>,
}

/// Create the bounded dispatch queue.
pub fn spawn_queue(capacity: usize) -> (ForwardHandle, ForwardReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ForwardHandle { tx },
        ForwardReceiver {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        },
    )
}

/// Run one delivery worker until cancellation or queue closure.
///
/// Workers race on the shared receiver; whichever is idle picks up the next
/// result. An in-flight retry sequence runs to completion — cancellation is
/// only observed between jobs.
pub async fn run_forward_worker(
    worker_id: usize,
    receiver: ForwardReceiver,
    forwarder: Arc<ResultForwarder>,
    cancel_token: CancellationToken,
) {
    info!(worker = worker_id, "Forward worker starting");

    loop {
        let job = {
            let mut rx = receiver.rx.lock().await;
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!(worker = worker_id, "Forward worker received shutdown signal");
                    return;
                }
                job = rx.recv() => job,
            }
        };

        match job {
            Some(result) => {
                let delivered = forwarder.forward(&result).await;
                debug!(
                    worker = worker_id,
                    line = %result.line_id,
                    delivered = delivered,
                    "Forward job finished"
                );
            }
            None => {
                info!(worker = worker_id, "Forward queue closed — worker exiting");
                return;
            }
        }
    }
}
