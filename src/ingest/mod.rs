//! Cycle-Time Ingestion Module
//!
//! Owns the path from the bus feed to the control pipeline:
//!
//! ```text
//! feed (TCP/stdin) ──▶ parse/validate ──▶ ControlPipeline::process
//!                                              │
//!                              sink phase: ────┴──▶ store.append
//!                                                └──▶ forward.dispatch
//! ```
//!
//! The sink phase runs after the pipeline's per-line lock is released, so
//! persistence and forwarding never block another producer's compute phase.

mod message;
pub mod source;

pub use message::{parse_message, BusMessage, MessageError};
pub use source::{SampleEvent, SampleSource, StdinSource, TcpSource};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::defaults::{INGEST_PROGRESS_INTERVAL, SECONDS_PER_MINUTE};
use crate::control::ControlPipeline;
use crate::forward::ForwardHandle;
use crate::storage::ControlLogStore;
use crate::types::CycleTimeSample;

// ============================================================================
// Bus Health
// ============================================================================

/// Shared feed-health indicator surfaced by the health endpoint.
#[derive(Debug, Default)]
pub struct BusHealth {
    connected: AtomicBool,
    messages_accepted: AtomicU64,
    messages_dropped: AtomicU64,
}

impl BusHealth {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_accepted(&self) {
        self.messages_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_accepted(&self) -> u64 {
        self.messages_accepted.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Ingest Loop
// ============================================================================

/// Final statistics returned when the loop exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    pub messages_processed: u64,
    pub messages_dropped: u64,
}

/// Owns all state needed to drive samples from a source into the pipeline.
pub struct IngestLoop {
    pipeline: Arc<ControlPipeline>,
    store: Option<ControlLogStore>,
    forward: Option<ForwardHandle>,
    health: Arc<BusHealth>,
    cancel_token: CancellationToken,
}

impl IngestLoop {
    pub fn new(
        pipeline: Arc<ControlPipeline>,
        store: Option<ControlLogStore>,
        forward: Option<ForwardHandle>,
        health: Arc<BusHealth>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            store,
            forward,
            health,
            cancel_token,
        }
    }

    /// Run the ingest loop until the source is exhausted or cancellation.
    ///
    /// Returns final statistics.
    pub async fn run<S: SampleSource>(self, source: &mut S) -> IngestStats {
        let mut stats = IngestStats::default();

        info!("Processing cycle-time messages from {}...", source.source_name());

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[Ingest] Shutdown signal received");
                    break;
                }
                result = source.next_event() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[Ingest] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            let message = match event {
                SampleEvent::Message(m) => m,
                SampleEvent::Eof => {
                    info!(
                        "[Ingest] Source reached end ({} messages processed)",
                        stats.messages_processed
                    );
                    break;
                }
            };

            self.handle_message(message, &mut stats);

            if stats.messages_processed % INGEST_PROGRESS_INTERVAL == 0
                && stats.messages_processed > 0
            {
                info!(
                    processed = stats.messages_processed,
                    dropped = stats.messages_dropped,
                    lines = self.pipeline.line_count(),
                    "Ingest progress"
                );
            }
        }

        info!(
            processed = stats.messages_processed,
            dropped = stats.messages_dropped,
            "[Ingest] Loop finished"
        );
        stats
    }

    /// Compute phase through the pipeline, then the sink phase (persistence
    /// append + forward dispatch) with no pipeline lock held.
    fn handle_message(&self, message: BusMessage, stats: &mut IngestStats) {
        let sample = CycleTimeSample {
            line_id: message.line_id,
            cycle_time_minutes: message.calculated_ct_seconds / SECONDS_PER_MINUTE,
            timestamp: message.timestamp.unwrap_or_else(Utc::now),
        };

        match self.pipeline.process(&sample, message.chain_state.as_ref()) {
            Ok(result) => {
                stats.messages_processed += 1;
                self.health.record_accepted();

                if let Some(store) = &self.store {
                    if let Err(e) = store.append(&sample, &result) {
                        warn!(line = %result.line_id, error = %e, "Failed to persist control log");
                    }
                }
                if let Some(forward) = &self.forward {
                    forward.dispatch(result);
                }
            }
            Err(e) => {
                stats.messages_dropped += 1;
                self.health.record_dropped();
                warn!(line = %sample.line_id, error = %e, "Dropping invalid cycle-time sample");
            }
        }
    }
}
