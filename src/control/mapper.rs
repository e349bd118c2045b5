//! Cycle-time to line-speed conversion.
//!
//! Cycle time and line speed are physically inverse — a shorter cycle time
//! means the line must run faster. The mapping is `speed = factor / ct`,
//! clamped into the configured operating band.

use crate::config::ControlSettings;

/// Stateless inverse mapper from filtered cycle time (minutes) to line speed.
#[derive(Debug, Clone)]
pub struct SpeedMapper {
    factor: f64,
    default_speed: f64,
    speed_min: f64,
    speed_max: f64,
}

impl SpeedMapper {
    pub fn new(settings: &ControlSettings) -> Self {
        Self {
            factor: settings.ct_to_speed_factor,
            default_speed: settings.default_speed,
            speed_min: settings.speed_min,
            speed_max: settings.speed_max,
        }
    }

    /// Map a filtered cycle time to a clamped line speed.
    ///
    /// Non-positive cycle times fall back to the configured default speed
    /// before clamping.
    pub fn map(&self, filtered_ct_minutes: f64) -> f64 {
        let raw = if filtered_ct_minutes > 0.0 {
            self.factor / filtered_ct_minutes
        } else {
            self.default_speed
        };
        raw.clamp(self.speed_min, self.speed_max)
    }
}
