//! Cycle-time smoothing filter.
//!
//! A bounded sliding-window moving average: the last N samples are kept in a
//! FIFO window and every push returns the unweighted mean of the values
//! currently held. Early on (window not yet full) the mean covers however
//! many samples have been seen.

use std::collections::VecDeque;

use super::ControlError;

/// Bounded moving-average filter over recent cycle-time values (minutes).
///
/// The filter is the sole owner of its window; state persists across calls.
#[derive(Debug)]
pub struct CycleTimeFilter {
    window: VecDeque<f64>,
    capacity: usize,
}

impl CycleTimeFilter {
    /// Create a filter with the given window size. Sizes below 1 are raised
    /// to 1 — a zero-length window has no meaningful mean.
    pub fn new(window_samples: usize) -> Self {
        let capacity = window_samples.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a cycle-time value (minutes) and return the filtered mean.
    ///
    /// Fails with [`ControlError::Validation`] for non-positive or
    /// non-finite values; the window is left untouched in that case.
    pub fn push(&mut self, value: f64) -> Result<f64, ControlError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ControlError::Validation(format!(
                "cycle time must be a positive finite number, got {value}"
            )));
        }

        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);

        let sum: f64 = self.window.iter().sum();
        Ok(sum / self.window.len() as f64)
    }

    /// Number of samples currently held (<= capacity).
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether no samples have been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Configured window capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
