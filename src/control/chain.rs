//! Chain-state telemetry cache.
//!
//! Conveyor chain telemetry (running flag, encoder delta) rides along with
//! cycle-time samples. The tracker keeps exactly one snapshot per line,
//! wholesale-replaced on every update — no merging with prior values.
//!
//! Staleness policy: a snapshot older than the configured threshold is
//! *flagged*, never rejected. Auxiliary telemetry lag must not turn into a
//! control outage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::ChainStateUpdate;

/// Latest known chain state for one line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStateSnapshot {
    pub is_running: Option<bool>,
    pub encoder_delta: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ChainStateSnapshot {
    /// Whether this snapshot is older than `max_age_secs` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        (now - self.updated_at).num_seconds() > max_age_secs as i64
    }
}

/// Best-effort cache of the most recent chain state for one line.
#[derive(Debug, Default)]
pub struct ChainStateTracker {
    snapshot: Option<ChainStateSnapshot>,
}

impl ChainStateTracker {
    pub fn new() -> Self {
        Self { snapshot: None }
    }

    /// Replace the stored snapshot with coerced fields from a raw update.
    ///
    /// Producer-side bridges emit loosely typed JSON; uncoercible values
    /// degrade to `None` with a warning rather than failing the sample.
    pub fn update(&mut self, raw: &ChainStateUpdate, now: DateTime<Utc>) {
        let is_running = raw.is_running.as_ref().and_then(coerce_bool);
        if raw.is_running.is_some() && is_running.is_none() {
            warn!(value = ?raw.is_running, "Uncoercible is_running in chain state, dropping field");
        }

        let encoder_delta = raw.encoder_delta.as_ref().and_then(coerce_f64);
        if raw.encoder_delta.is_some() && encoder_delta.is_none() {
            warn!(value = ?raw.encoder_delta, "Uncoercible encoder_delta in chain state, dropping field");
        }

        self.snapshot = Some(ChainStateSnapshot {
            is_running,
            encoder_delta,
            updated_at: now,
        });
    }

    /// Current snapshot, if any update has been received.
    pub fn snapshot(&self) -> Option<&ChainStateSnapshot> {
        self.snapshot.as_ref()
    }

    /// Whether the stored snapshot exists and is older than the threshold.
    /// An absent snapshot is never stale — there is nothing to distrust.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.is_stale(now, max_age_secs))
    }
}

/// JSON truthiness: booleans as-is, numbers by non-zero, strings by
/// non-emptiness. Null never reaches here (it deserializes to `None`).
fn coerce_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        serde_json::Value::String(s) => Some(!s.is_empty()),
        _ => None,
    }
}

/// Numeric coercion: JSON numbers directly, numeric strings by parsing.
fn coerce_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
