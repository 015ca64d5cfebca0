//! Four-step self-calibration.
//!
//! Each step runs once the gimbal has settled after the previous one. Step 0 centres
//! both actuators, steps 1 and 2 sweep one actuator each by a fixed fraction of its
//! travel, and the settled orientation after each sweep yields that actuator's
//! microseconds-per-degree scales. Step 3 picks the azimuth actuator.

use crate::controller::{
    motor::{ActuatorRoles, MotorIndex, MotorState},
    orientation::{Orientation, circular_distance},
};

pub const CALIBRATION_STEPS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    #[default]
    AwaitingStep0,
    AwaitingStep1,
    AwaitingStep2,
    AwaitingStep3,
    Calibrated,
}

impl CalibrationState {
    pub fn step(self) -> u8 {
        match self {
            CalibrationState::AwaitingStep0 => 0,
            CalibrationState::AwaitingStep1 => 1,
            CalibrationState::AwaitingStep2 => 2,
            CalibrationState::AwaitingStep3 => 3,
            CalibrationState::Calibrated => CALIBRATION_STEPS,
        }
    }

    pub fn is_calibrated(self) -> bool {
        self == CalibrationState::Calibrated
    }

    /// Step 0 has run but the sequence is not finished yet.
    pub fn in_progress(self) -> bool {
        matches!(
            self,
            CalibrationState::AwaitingStep1
                | CalibrationState::AwaitingStep2
                | CalibrationState::AwaitingStep3
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseCommand {
    pub motor: MotorIndex,
    pub pulse: f32,
}

/// Microseconds of pulse width per degree of motion on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScales {
    pub azimuth: f32,
    pub elevation: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStep {
    pub next: CalibrationState,
    /// Issued in order, with a pause after each.
    pub commands: Vec<PulseCommand>,
    pub measured: Option<(MotorIndex, AxisScales)>,
    pub roles: Option<ActuatorRoles>,
}

impl CalibrationStep {
    fn idle(state: CalibrationState) -> Self {
        Self {
            next: state,
            commands: Vec::new(),
            measured: None,
            roles: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationProcedure {
    fraction: f32,
}

impl CalibrationProcedure {
    pub fn new(fraction: f32) -> Self {
        Self { fraction }
    }

    pub fn excursion(&self, motor: &MotorState) -> f32 {
        self.fraction * motor.range() as f32
    }

    /// Start point that centres the upcoming sweep within the travel.
    pub fn start_pulse(&self, motor: &MotorState) -> f32 {
        motor.pulse_at_fraction((1.0 - self.fraction) / 2.0)
    }

    pub fn measure(
        &self,
        motor: &MotorState,
        baseline: Orientation,
        sample: Orientation,
    ) -> AxisScales {
        let excursion = self.excursion(motor);
        AxisScales {
            azimuth: excursion / circular_distance(baseline.azimuth, sample.azimuth),
            elevation: excursion / (sample.elevation - baseline.elevation),
        }
    }

    /// Computes the transition out of `state` given a settled `sample` and the
    /// settled sample of the previous step. Does not touch any hardware.
    pub fn advance(
        &self,
        state: CalibrationState,
        sample: Orientation,
        baseline: Orientation,
        motors: &[MotorState; 2],
    ) -> CalibrationStep {
        let [first, second] = motors;

        match state {
            CalibrationState::AwaitingStep0 => CalibrationStep {
                next: CalibrationState::AwaitingStep1,
                commands: vec![
                    PulseCommand {
                        motor: MotorIndex::First,
                        pulse: self.start_pulse(first),
                    },
                    PulseCommand {
                        motor: MotorIndex::Second,
                        pulse: self.start_pulse(second),
                    },
                ],
                measured: None,
                roles: None,
            },
            CalibrationState::AwaitingStep1 => CalibrationStep {
                next: CalibrationState::AwaitingStep2,
                commands: vec![PulseCommand {
                    motor: MotorIndex::First,
                    pulse: first.current_pulse() as f32 + self.excursion(first),
                }],
                measured: None,
                roles: None,
            },
            CalibrationState::AwaitingStep2 => CalibrationStep {
                next: CalibrationState::AwaitingStep3,
                commands: vec![PulseCommand {
                    motor: MotorIndex::Second,
                    pulse: second.current_pulse() as f32 + self.excursion(second),
                }],
                measured: Some((MotorIndex::First, self.measure(first, baseline, sample))),
                roles: None,
            },
            CalibrationState::AwaitingStep3 => {
                let scales = self.measure(second, baseline, sample);
                CalibrationStep {
                    next: CalibrationState::Calibrated,
                    commands: Vec::new(),
                    measured: Some((MotorIndex::Second, scales)),
                    roles: Some(ActuatorRoles::from_azimuth_scales(
                        first.az_scale(),
                        scales.azimuth,
                    )),
                }
            }
            CalibrationState::Calibrated => CalibrationStep::idle(state),
        }
    }
}
