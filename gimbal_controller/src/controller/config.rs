use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Minimum time between two accepted control cycles.
    pub update_period_ms: u64,
    /// Largest per-axis change between two samples, in degrees, that still counts as settled.
    pub settle_threshold_deg: f32,
    /// Fraction of each actuator's travel swept while measuring its scales.
    pub calibration_fraction: f32,
    /// Pause after each calibration move.
    pub calibration_pause_ms: u64,
    pub rescale_min_angle_deg: f32,
    pub rescale_max_change: f32,
    /// Stored scales larger than this (in magnitude) are treated as corrupt.
    pub max_stored_scale: f32,
    pub home_azimuth_deg: f32,
    pub home_elevation_deg: f32,
    /// Control cycles a full calibration may take before giving up.
    pub max_calibration_cycles: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            update_period_ms: 500,
            settle_threshold_deg: 0.5,
            calibration_fraction: 0.333,
            calibration_pause_ms: 500,
            rescale_min_angle_deg: 30.0,
            rescale_max_change: 0.1,
            max_stored_scale: 50.0,
            home_azimuth_deg: 0.0,
            home_elevation_deg: 45.0,
            max_calibration_cycles: 40,
        }
    }
}

impl ControllerConfig {
    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms)
    }

    pub fn calibration_pause(&self) -> Duration {
        Duration::from_millis(self.calibration_pause_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.update_period_ms == 0 {
            return Err("controller.update_period_ms must be positive".to_string());
        }
        if !(self.settle_threshold_deg > 0.0) {
            return Err("controller.settle_threshold_deg must be positive".to_string());
        }
        if !(self.calibration_fraction > 0.0 && self.calibration_fraction < 1.0) {
            return Err("controller.calibration_fraction must lie strictly between 0 and 1".to_string());
        }
        if !(self.rescale_max_change > 0.0) {
            return Err("controller.rescale_max_change must be positive".to_string());
        }
        if self.max_calibration_cycles == 0 {
            return Err("controller.max_calibration_cycles must be positive".to_string());
        }
        Ok(())
    }
}
