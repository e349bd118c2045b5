//! System-wide default constants.
//!
//! Centralises magic numbers used outside the operator-tunable TOML config.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Control
// ============================================================================

/// Seconds per minute — cycle times cross this boundary at the bus edge
/// (bus payloads carry seconds, the pipeline computes in minutes).
pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// Equivalent cycle time (minutes) assigned to a manual command with
/// `speed <= 0` — parks the line at its minimum speed.
pub const STOPPED_LINE_CT_MINUTES: f64 = 60.0;

// ============================================================================
// Forwarding
// ============================================================================

/// Base delay of the exponential retry backoff (milliseconds).
///
/// Attempt n waits `FORWARD_BACKOFF_BASE_MS * 2^(n-1)` before the next try.
pub const FORWARD_BACKOFF_BASE_MS: u64 = 1_000;

// ============================================================================
// Storage / Export
// ============================================================================

/// Maximum rows emitted by a CSV export (newest first).
pub const EXPORT_ROW_LIMIT: usize = 1_000;

// ============================================================================
// Ingest
// ============================================================================

/// Progress log cadence in the ingest loop (messages).
pub const INGEST_PROGRESS_INTERVAL: u64 = 100;
