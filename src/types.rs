//! Core domain types shared across the pipeline, ingest, and API layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single cycle-time observation for one production line.
///
/// Ephemeral — samples are consumed by the pipeline and never stored as-is
/// (the persisted record is the derived [`ControlResult`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleTimeSample {
    /// Production line identifier (must be non-blank)
    pub line_id: String,
    /// Observed cycle time in minutes (must be > 0 and finite)
    pub cycle_time_minutes: f64,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

/// Raw chain-state telemetry as delivered on the bus.
///
/// Fields arrive loosely typed (the producer side sends whatever its PLC
/// bridge emits), so they are kept as JSON values here and coerced by
/// [`ChainStateTracker`](crate::control::ChainStateTracker) on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainStateUpdate {
    /// Whether the conveyor chain is running (truthy value of any JSON type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_running: Option<serde_json::Value>,
    /// Encoder delta since the previous report (numeric value)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_delta: Option<serde_json::Value>,
}

/// Outcome classification of a processed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    /// Sample passed validation and produced an output
    Valid,
}

impl std::fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlStatus::Valid => write!(f, "valid"),
        }
    }
}

/// The decision produced by one pipeline pass. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResult {
    /// Line the decision applies to
    pub line_id: String,
    /// Outcome classification
    pub status: ControlStatus,
    /// Clamped line speed the voltage was derived from
    pub speed_used: f64,
    /// Ramp-limited analog output voltage
    pub voltage: f64,
    /// Filtered cycle time, converted to seconds
    pub filtered_ct_seconds: f64,
    /// Whether the line's chain-state snapshot was older than the configured
    /// staleness threshold at compute time (flag only — see DESIGN.md)
    pub chain_stale: bool,
    /// When the output was applied
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_status_serializes_lowercase() {
        let json = serde_json::to_string(&ControlStatus::Valid).unwrap();
        assert_eq!(json, "\"valid\"");
        assert_eq!(ControlStatus::Valid.to_string(), "valid");
    }

    #[test]
    fn test_chain_state_update_accepts_loose_types() {
        let raw = r#"{"is_running": 1, "encoder_delta": "3.5"}"#;
        let update: ChainStateUpdate = serde_json::from_str(raw).unwrap();
        assert!(update.is_running.is_some());
        assert!(update.encoder_delta.is_some());
    }

    #[test]
    fn test_chain_state_update_fields_optional() {
        let update: ChainStateUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.is_running.is_none());
        assert!(update.encoder_delta.is_none());
    }

    #[test]
    fn test_control_result_round_trip() {
        let result = ControlResult {
            line_id: "LINE-01".to_string(),
            status: ControlStatus::Valid,
            speed_used: 50.0,
            voltage: 5.0,
            filtered_ct_seconds: 72.0,
            chain_stale: false,
            applied_at: Utc::now(),
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: ControlResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.line_id, "LINE-01");
        assert_eq!(back.status, ControlStatus::Valid);
        assert!((back.voltage - 5.0).abs() < f64::EPSILON);
    }
}
