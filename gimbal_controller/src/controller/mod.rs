use std::{fmt, str::FromStr};

use crate::controller::{
    calibration::CalibrationState,
    error::{CalibrationError, OverrideError, SensorError},
    motor::MotorIndex,
    orientation::Orientation,
    status::{SensorReport, StatusReport},
};

pub mod calibration;
pub mod config;
pub mod error;
pub mod gimbal;
pub mod interfaces;
pub mod motor;
pub mod orientation;
pub mod status;

/// What a single control cycle did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Called again before the update period elapsed.
    RateLimited,
    /// The sensor sample was out of range and was ignored.
    InvalidSample(Orientation),
    /// The gimbal has not settled since the previous sample.
    Moving(Orientation),
    /// A calibration step ran; carries the state it left behind.
    Calibrating(CalibrationState),
    /// Corrective moves were issued towards the target.
    Tracking {
        azimuth_error: f32,
        elevation_error: f32,
    },
}

/// Operator-writable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideField {
    Position(MotorIndex),
    Min(MotorIndex),
    Max(MotorIndex),
}

impl OverrideField {
    pub fn motor(&self) -> MotorIndex {
        match self {
            OverrideField::Position(motor) | OverrideField::Min(motor) | OverrideField::Max(motor) => *motor,
        }
    }
}

impl FromStr for OverrideField {
    type Err = OverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || OverrideError::UnknownField(s.to_string());

        let rest = s.strip_prefix("motor").ok_or_else(unknown)?;
        let mut chars = rest.chars();
        let motor = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .and_then(|d| MotorIndex::from_index(d as u8))
            .ok_or_else(unknown)?;

        match chars.as_str() {
            "Pos" => Ok(OverrideField::Position(motor)),
            "Min" => Ok(OverrideField::Min(motor)),
            "Max" => Ok(OverrideField::Max(motor)),
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for OverrideField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideField::Position(motor) => write!(f, "motor{motor}Pos"),
            OverrideField::Min(motor) => write!(f, "motor{motor}Min"),
            OverrideField::Max(motor) => write!(f, "motor{motor}Max"),
        }
    }
}

/// Operations the command executor drives.
pub trait Gimbal {
    /// One control cycle towards the target. Call it periodically; it rate-limits itself.
    fn move_to_az_el(&mut self, azimuth: f32, elevation: f32) -> CycleOutcome;

    fn move_home(&mut self) -> CycleOutcome;

    /// The next settled cycles re-run calibration from step 0.
    fn reset_calibration(&mut self);

    fn override_field(&mut self, field: OverrideField, value: u16) -> Result<(), OverrideError>;

    /// Blocks until all four calibration steps have run, then returns home.
    fn calibrate_fully(&mut self) -> Result<(), CalibrationError>;

    /// True between step 0 and completion. Other control entry points should wait.
    fn is_calibrating(&self) -> bool;

    fn status(&self) -> StatusReport;

    fn orientation(&mut self) -> Orientation;

    fn temperature(&mut self) -> Option<f32>;

    /// Applies and persists an operator-set magnetic declination.
    fn set_declination(&mut self, degrees: f32) -> Result<(), OverrideError>;

    /// Persists the sensor's own calibration offsets so they are restored at start-up.
    fn save_sensor_calibration(&mut self) -> Result<(), SensorError>;

    fn sensor_status(&mut self) -> SensorReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_field_names() {
        assert_eq!(
            "motor0Min".parse::<OverrideField>(),
            Ok(OverrideField::Min(MotorIndex::First))
        );
        assert_eq!(
            "motor1Pos".parse::<OverrideField>(),
            Ok(OverrideField::Position(MotorIndex::Second))
        );
        assert_eq!(OverrideField::Max(MotorIndex::Second).to_string(), "motor1Max");
    }

    #[test]
    fn unknown_override_fields() {
        for name in ["motor2Min", "motorMin", "motor0Speed", "servo0Min", ""] {
            assert_eq!(
                name.parse::<OverrideField>(),
                Err(OverrideError::UnknownField(name.to_string()))
            );
        }
    }
}
