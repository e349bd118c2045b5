//! Voltage ramp limiter.
//!
//! Maps a clamped line speed linearly into the analog voltage range and
//! bounds how fast the output may move per unit wall-clock time. The first
//! application for a fresh state, or any application with `dt <= 0`, snaps
//! directly to the target.

use chrono::{DateTime, Utc};

use crate::config::ControlSettings;

/// Rate-limited voltage tracker. Mutated in place by every application;
/// one instance lives per production line.
#[derive(Debug)]
pub struct VoltageRampLimiter {
    speed_min: f64,
    speed_max: f64,
    voltage_min: f64,
    voltage_max: f64,
    ramp_rate_v_per_sec: f64,
    last_voltage: Option<f64>,
    last_applied_at: Option<DateTime<Utc>>,
}

impl VoltageRampLimiter {
    pub fn new(settings: &ControlSettings) -> Self {
        Self {
            speed_min: settings.speed_min,
            speed_max: settings.speed_max,
            voltage_min: settings.voltage_min,
            voltage_max: settings.voltage_max,
            ramp_rate_v_per_sec: settings.ramp_rate_v_per_sec,
            last_voltage: None,
            last_applied_at: None,
        }
    }

    /// Apply a speed at the given instant and return the ramp-limited voltage.
    pub fn apply(&mut self, speed: f64, now: DateTime<Utc>) -> f64 {
        let target = self.target_voltage(speed);

        let (Some(prev_voltage), Some(prev_at)) = (self.last_voltage, self.last_applied_at) else {
            return self.snap(target, now);
        };

        let dt_secs = (now - prev_at).num_milliseconds() as f64 / 1_000.0;
        if dt_secs <= 0.0 {
            return self.snap(target, now);
        }

        let max_step = self.ramp_rate_v_per_sec.max(0.0) * dt_secs;
        let delta = (target - prev_voltage).clamp(-max_step, max_step);
        let next = prev_voltage + delta;

        self.last_voltage = Some(next);
        self.last_applied_at = Some(now);
        next
    }

    /// Last applied voltage, if any output has been produced yet.
    pub fn last_voltage(&self) -> Option<f64> {
        self.last_voltage
    }

    /// Linear speed→voltage target. A degenerate speed span pins the target
    /// to the bottom of the voltage range.
    fn target_voltage(&self, speed: f64) -> f64 {
        let span = self.speed_max - self.speed_min;
        if span <= 0.0 {
            return self.voltage_min;
        }
        let ratio = ((speed - self.speed_min) / span).clamp(0.0, 1.0);
        self.voltage_min + ratio * (self.voltage_max - self.voltage_min)
    }

    fn snap(&mut self, target: f64, now: DateTime<Utc>) -> f64 {
        self.last_voltage = Some(target);
        self.last_applied_at = Some(now);
        target
    }
}
