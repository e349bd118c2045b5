//! Control Pipeline Module
//!
//! The real-time path from a raw cycle-time sample to a rate-limited,
//! clamped output voltage:
//!
//! ```text
//! CycleTimeSample ──▶ CycleTimeFilter ──▶ SpeedMapper ──▶ VoltageRampLimiter
//!                        (smoothing)      (inverse map)     (slew limiting)
//! ```
//!
//! Each production line owns an independent state bundle (filter window,
//! ramp state, chain snapshot, last outputs); [`ControlPipeline`] partitions
//! them by `line_id` so concurrent lines never contend.

mod chain;
mod filter;
mod mapper;
mod pipeline;
mod ramp;

pub use chain::{ChainStateSnapshot, ChainStateTracker};
pub use filter::CycleTimeFilter;
pub use mapper::SpeedMapper;
pub use pipeline::{ControlPipeline, LineSnapshot};
pub use ramp::VoltageRampLimiter;

/// Errors surfaced synchronously by the control pipeline.
///
/// Validation failures are never retried — the caller decides whether to
/// drop the sample (bus path) or report it (HTTP 400 on the command path).
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("validation error: {0}")]
    Validation(String),
}
