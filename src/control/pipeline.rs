//! Control pipeline orchestrator.
//!
//! Turns a validated cycle-time sample into a [`ControlResult`]:
//!
//! 1. chain-state update (if telemetry is present)
//! 2. moving-average filtering
//! 3. inverse CT→speed mapping with clamping
//! 4. voltage ramp limiting
//!
//! Steps 1–4 are the compute phase and run under that line's lock; the
//! compute phase performs no I/O. Persistence and forwarding (the sink
//! phase) happen in the callers, after the lock is released, so slow
//! downstream calls never block another producer's compute phase.
//!
//! State is partitioned per `line_id`: each line owns an independent
//! filter window, ramp state, chain snapshot, and last-known outputs.
//! Samples for different lines never contend; samples for the same line
//! serialize in lock-acquisition order.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ControlSettings;
use crate::config::defaults::SECONDS_PER_MINUTE;
use crate::types::{ChainStateUpdate, ControlResult, ControlStatus, CycleTimeSample};

use super::chain::{ChainStateSnapshot, ChainStateTracker};
use super::filter::CycleTimeFilter;
use super::mapper::SpeedMapper;
use super::ramp::VoltageRampLimiter;
use super::ControlError;

/// All mutable state owned by one production line.
#[derive(Debug)]
struct LineState {
    filter: CycleTimeFilter,
    ramp: VoltageRampLimiter,
    chain: ChainStateTracker,
    last_speed: Option<f64>,
    last_voltage: Option<f64>,
    last_filtered_ct_minutes: Option<f64>,
}

impl LineState {
    fn new(settings: &ControlSettings) -> Self {
        Self {
            filter: CycleTimeFilter::new(settings.ct_filter_window_samples),
            ramp: VoltageRampLimiter::new(settings),
            chain: ChainStateTracker::new(),
            last_speed: None,
            last_voltage: None,
            last_filtered_ct_minutes: None,
        }
    }
}

/// Read-only view of one line's last-known outputs, for the state endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub line_id: String,
    pub last_speed: Option<f64>,
    pub last_voltage: Option<f64>,
    pub last_filtered_ct_minutes: Option<f64>,
    pub chain: Option<ChainStateSnapshot>,
    pub chain_stale: bool,
}

/// The single serialization point for all producers.
///
/// Shared as `Arc<ControlPipeline>` between the bus ingest task and the
/// HTTP command handlers; `process` takes `&self` and locks only the
/// affected line's state for the duration of the compute phase.
pub struct ControlPipeline {
    settings: ControlSettings,
    mapper: SpeedMapper,
    lines: DashMap<String, Arc<Mutex<LineState>>>,
}

impl ControlPipeline {
    pub fn new(settings: ControlSettings) -> Self {
        info!(
            window = settings.ct_filter_window_samples,
            speed_min = settings.speed_min,
            speed_max = settings.speed_max,
            ramp_rate = settings.ramp_rate_v_per_sec,
            "Initializing control pipeline"
        );
        Self {
            mapper: SpeedMapper::new(&settings),
            lines: DashMap::new(),
            settings,
        }
    }

    /// Process one sample through the compute phase and return the decision.
    ///
    /// Fails with [`ControlError::Validation`] for a blank `line_id` or a
    /// non-positive/non-finite cycle time. Validation errors are surfaced
    /// synchronously and never retried.
    pub fn process(
        &self,
        sample: &CycleTimeSample,
        chain_state: Option<&ChainStateUpdate>,
    ) -> Result<ControlResult, ControlError> {
        if sample.line_id.trim().is_empty() {
            return Err(ControlError::Validation(
                "line_id must not be empty".to_string(),
            ));
        }
        if !sample.cycle_time_minutes.is_finite() || sample.cycle_time_minutes <= 0.0 {
            return Err(ControlError::Validation(format!(
                "cycle_time_minutes must be > 0, got {}",
                sample.cycle_time_minutes
            )));
        }

        let line = self.line_state(&sample.line_id);
        let mut state = line.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        // Compute phase — exclusive per-line access, no I/O from here on.
        let now = Utc::now();

        if let Some(raw) = chain_state {
            state.chain.update(raw, now);
        }

        let filtered = state.filter.push(sample.cycle_time_minutes)?;
        let speed = self.mapper.map(filtered);
        let voltage = state.ramp.apply(speed, now);
        let chain_stale = state
            .chain
            .is_stale(now, self.settings.max_chain_age_secs);

        state.last_speed = Some(speed);
        state.last_voltage = Some(voltage);
        state.last_filtered_ct_minutes = Some(filtered);

        debug!(
            line = %sample.line_id,
            speed = speed,
            voltage = voltage,
            filtered_ct_min = filtered,
            "Processed cycle-time sample"
        );

        Ok(ControlResult {
            line_id: sample.line_id.clone(),
            status: ControlStatus::Valid,
            speed_used: speed,
            voltage,
            filtered_ct_seconds: filtered * SECONDS_PER_MINUTE,
            chain_stale,
            applied_at: now,
        })
    }

    /// Last-known outputs for one line.
    pub fn snapshot(&self, line_id: &str) -> Option<LineSnapshot> {
        let line = self.lines.get(line_id)?;
        let state = line.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Some(Self::snapshot_locked(line_id, &state, &self.settings))
    }

    /// Last-known outputs for every line seen so far, sorted by line id.
    pub fn snapshot_all(&self) -> Vec<LineSnapshot> {
        let mut snapshots: Vec<LineSnapshot> = self
            .lines
            .iter()
            .map(|entry| {
                let state = entry
                    .value()
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                Self::snapshot_locked(entry.key(), &state, &self.settings)
            })
            .collect();
        snapshots.sort_by(|a, b| a.line_id.cmp(&b.line_id));
        snapshots
    }

    /// Number of lines with state.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Control settings the pipeline was built with.
    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    fn snapshot_locked(
        line_id: &str,
        state: &LineState,
        settings: &ControlSettings,
    ) -> LineSnapshot {
        let now = Utc::now();
        LineSnapshot {
            line_id: line_id.to_string(),
            last_speed: state.last_speed,
            last_voltage: state.last_voltage,
            last_filtered_ct_minutes: state.last_filtered_ct_minutes,
            chain: state.chain.snapshot().cloned(),
            chain_stale: state.chain.is_stale(now, settings.max_chain_age_secs),
        }
    }

    fn line_state(&self, line_id: &str) -> Arc<Mutex<LineState>> {
        if let Some(existing) = self.lines.get(line_id) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.lines
                .entry(line_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(LineState::new(&self.settings))))
                .value(),
        )
    }
}
