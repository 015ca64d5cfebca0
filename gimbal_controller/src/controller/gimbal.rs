use std::time::Instant;

use bno055::SensorOffsets;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    controller::{
        CycleOutcome, Gimbal, OverrideField,
        calibration::{CALIBRATION_STEPS, CalibrationProcedure, CalibrationState},
        config::ControllerConfig,
        error::{CalibrationError, OverrideError, SensorError},
        interfaces::{Actuator, Clock, OrientationSensor, PersistentStore},
        motor::{ActuatorRoles, MotorIndex, MotorState},
        orientation::{Orientation, circular_distance},
        status::{GimbalStatus, MotorReport, SensorReport, StatusReport},
    },
    store::{CalibrationRecord, MotorRecord, SensorRecord},
};

/// Where an azimuth actuator pinned at an endstop is sent, as a fraction of its travel.
const ESCAPE_FROM_MIN: f32 = 0.9;
const ESCAPE_FROM_MAX: f32 = 0.1;

const MAX_DECLINATION_DEG: f32 = 180.0;

/// Closed-loop pointing controller for a two-servo gimbal whose axes are not
/// mechanically aligned with azimuth and elevation.
pub struct GimbalController<S, A, P, C> {
    sensor: S,
    actuator: Option<A>,
    store: P,
    clock: C,
    params: ControllerConfig,
    procedure: CalibrationProcedure,

    motors: [MotorState; 2],
    calibration: CalibrationState,
    roles: ActuatorRoles,

    sensor_settings: SensorRecord,

    prev_fast: Option<Orientation>,
    prev_stop: Option<Orientation>,
    last_update: Option<Instant>,
}

impl<S, A, P, C> GimbalController<S, A, P, C>
where
    S: OrientationSensor,
    A: Actuator,
    P: PersistentStore,
    C: Clock,
{
    pub fn new(
        sensor: S,
        actuator: Option<A>,
        mut store: P,
        clock: C,
        params: ControllerConfig,
    ) -> Self {
        if actuator.is_none() {
            warn!("Servo driver not found, actuator commands will be ignored");
        }

        let mut record = store.load().unwrap_or_else(|e| {
            warn!("No usable calibration record ({}), starting uncalibrated", e);
            CalibrationRecord::default()
        });

        for (index, motor) in record.motors.iter_mut().enumerate() {
            if !motor.has_valid_limits() {
                warn!(
                    motor = index,
                    min = motor.min_pulse,
                    max = motor.max_pulse,
                    "Stored servo limits are inverted, using defaults and recalibrating"
                );
                *motor = MotorRecord::default();
                record.step = 0;
            }
        }

        let motors = [
            MotorState::new(record.motors[0].min_pulse, record.motors[0].max_pulse),
            MotorState::new(record.motors[1].min_pulse, record.motors[1].max_pulse),
        ];

        let mut controller = Self {
            sensor,
            actuator,
            store,
            clock,
            procedure: CalibrationProcedure::new(params.calibration_fraction),
            params,
            motors,
            calibration: CalibrationState::AwaitingStep0,
            roles: ActuatorRoles::default(),
            sensor_settings: record.sensor.clone(),
            prev_fast: None,
            prev_stop: None,
            last_update: None,
        };
        controller.install_calibration(&record);
        controller.install_sensor_settings();
        controller
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration
    }

    pub fn roles(&self) -> ActuatorRoles {
        self.roles
    }

    pub fn motor(&self, motor: MotorIndex) -> &MotorState {
        &self.motors[motor.index()]
    }

    fn install_calibration(&mut self, record: &CalibrationRecord) {
        for (motor, stored) in self.motors.iter_mut().zip(&record.motors) {
            motor.set_az_scale(stored.az_scale);
            motor.set_el_scale(stored.el_scale);
        }

        let roles = MotorIndex::from_index(record.best_az_motor).map(ActuatorRoles::with_azimuth);
        match roles {
            Some(roles) if record.step == CALIBRATION_STEPS && self.plausible(roles) => {
                self.roles = roles;
                self.calibration = CalibrationState::Calibrated;
                info!(
                    azimuth_motor = %roles.azimuth,
                    "Loaded stored calibration"
                );
            }
            _ => {
                self.calibration = CalibrationState::AwaitingStep0;
                info!(
                    step = record.step,
                    best_az_motor = record.best_az_motor,
                    "Stored calibration incomplete or implausible, recalibration required"
                );
            }
        }
    }

    fn install_sensor_settings(&mut self) {
        if let Some(degrees) = self.sensor_settings.declination_deg {
            if degrees.is_finite() {
                self.sensor.set_declination(degrees);
            } else {
                self.sensor_settings.declination_deg = None;
            }
        }

        match self.sensor_settings.offsets.map(SensorOffsets) {
            Some(offsets) if !offsets.is_blank() => match self.sensor.install_offsets(&offsets) {
                Ok(()) => info!("Restored orientation sensor calibration"),
                Err(e) => warn!("Failed to restore orientation sensor calibration: {}", e),
            },
            _ => info!("No stored orientation sensor calibration"),
        }
    }

    fn plausible(&self, roles: ActuatorRoles) -> bool {
        let limit = self.params.max_stored_scale;
        self.motors[roles.azimuth.index()].az_scale().abs() <= limit
            && self.motors[roles.elevation.index()].el_scale().abs() <= limit
    }

    fn record(&self) -> CalibrationRecord {
        let motor_record = |motor: &MotorState| MotorRecord {
            min_pulse: motor.min_pulse(),
            max_pulse: motor.max_pulse(),
            az_scale: motor.az_scale(),
            el_scale: motor.el_scale(),
        };

        CalibrationRecord {
            best_az_motor: self.roles.azimuth.index() as u8,
            step: self.calibration.step(),
            motors: [motor_record(&self.motors[0]), motor_record(&self.motors[1])],
            sensor: self.sensor_settings.clone(),
        }
    }

    fn persist(&mut self) {
        let record = self.record();
        if let Err(e) = self.store.save(&record) {
            error!("Failed to persist calibration record: {}", e);
        }
    }

    /// Clamps and emits one pulse. Does nothing at all without an actuator.
    fn set_actuator_position(&mut self, motor: MotorIndex, requested: f32) {
        let Some(actuator) = self.actuator.as_mut() else {
            return;
        };

        let state = &mut self.motors[motor.index()];
        match state.command(requested) {
            Some(pulse) => {
                debug!(%motor, pulse, at_min = state.at_min(), at_max = state.at_max(), "Servo command");
                actuator.set_pulse(motor, pulse);
            }
            None => warn!(%motor, requested, "Dropping non-finite servo command"),
        }
    }

    fn calibrate(&mut self, sample: Orientation) -> CycleOutcome {
        // Only the very first settled cycle lacks a stop sample, and step 0 measures nothing.
        let baseline = self.prev_stop.unwrap_or(sample);
        let step = self
            .procedure
            .advance(self.calibration, sample, baseline, &self.motors);

        info!(step = self.calibration.step(), "Calibrating gimbal");

        if let Some((motor, scales)) = step.measured {
            let state = &mut self.motors[motor.index()];
            state.set_az_scale(scales.azimuth);
            state.set_el_scale(scales.elevation);
            info!(
                %motor,
                az_scale = scales.azimuth,
                el_scale = scales.elevation,
                "Measured servo scales"
            );
        }

        for command in &step.commands {
            self.set_actuator_position(command.motor, command.pulse);
            self.clock.sleep(self.params.calibration_pause());
        }

        if let Some(roles) = step.roles {
            self.roles = roles;
        }
        self.calibration = step.next;

        if self.calibration.is_calibrated() {
            info!(azimuth_motor = %self.roles.azimuth, "Calibration complete");
            self.persist();
        }

        CycleOutcome::Calibrating(self.calibration)
    }

    /// Refines the scale of an axis after a large settled move, using the pulse change
    /// that produced it. Estimates that differ too much from the current scale are ignored.
    fn rescale(&mut self, sample: Orientation) {
        let Some(stop) = self.prev_stop else {
            return;
        };
        let min_angle = self.params.rescale_min_angle_deg;
        let max_change = self.params.rescale_max_change;

        let az_move = circular_distance(stop.azimuth, sample.azimuth);
        if az_move.abs() >= min_angle {
            let motor = &mut self.motors[self.roles.azimuth.index()];
            let estimate = motor.delta_pulse() as f32 / az_move;
            if within_change(motor.az_scale(), estimate, max_change) {
                info!(old = motor.az_scale(), new = estimate, "Updated azimuth scale");
                motor.set_az_scale(estimate);
            } else {
                debug!(current = motor.az_scale(), estimate, "Rejected azimuth scale estimate");
            }
        }

        let el_move = sample.elevation - stop.elevation;
        if el_move.abs() >= min_angle {
            let motor = &mut self.motors[self.roles.elevation.index()];
            let estimate = motor.delta_pulse() as f32 / el_move;
            if within_change(motor.el_scale(), estimate, max_change) {
                info!(old = motor.el_scale(), new = estimate, "Updated elevation scale");
                motor.set_el_scale(estimate);
            } else {
                debug!(current = motor.el_scale(), estimate, "Rejected elevation scale estimate");
            }
        }
    }

    fn seek(&mut self, target: Orientation, sample: Orientation) -> CycleOutcome {
        let azimuth_error = circular_distance(sample.azimuth, target.azimuth);
        let elevation_error = target.elevation - sample.elevation;
        debug!(azimuth_error, elevation_error, "Seeking target");

        self.rescale(sample);

        let ActuatorRoles { azimuth, elevation } = self.roles;

        let az_motor = &self.motors[azimuth.index()];
        let az_pulse = if az_motor.at_min() {
            az_motor.pulse_at_fraction(ESCAPE_FROM_MIN)
        } else if az_motor.at_max() {
            az_motor.pulse_at_fraction(ESCAPE_FROM_MAX)
        } else {
            az_motor.current_pulse() as f32 + azimuth_error * az_motor.az_scale()
        };
        if az_motor.at_min() || az_motor.at_max() {
            info!(motor = %azimuth, "Azimuth servo at endstop, swinging back");
        }
        self.set_actuator_position(azimuth, az_pulse);

        // Elevation spans less than the servo travel, so it never needs an escape.
        let el_motor = &self.motors[elevation.index()];
        let el_pulse = el_motor.current_pulse() as f32 + elevation_error * el_motor.el_scale();
        self.set_actuator_position(elevation, el_pulse);

        CycleOutcome::Tracking {
            azimuth_error,
            elevation_error,
        }
    }

    fn apply_limits(&mut self, motor: MotorIndex, min: u16, max: u16) -> Result<(), OverrideError> {
        if min >= max {
            return Err(OverrideError::InvalidLimits { min, max });
        }

        let state = &mut self.motors[motor.index()];
        state.set_limits(min, max);
        if state.is_commanded() {
            let current = state.current_pulse() as f32;
            self.set_actuator_position(motor, current);
        }
        Ok(())
    }
}

fn within_change(current: f32, estimate: f32, max_change: f32) -> bool {
    ((estimate - current) / current).abs() < max_change
}

impl<S, A, P, C> Gimbal for GimbalController<S, A, P, C>
where
    S: OrientationSensor,
    A: Actuator,
    P: PersistentStore,
    C: Clock,
{
    #[instrument(level = "debug", skip(self))]
    fn move_to_az_el(&mut self, azimuth: f32, elevation: f32) -> CycleOutcome {
        let now = self.clock.now();
        let period = self.params.update_period();
        if self.last_update.is_some_and(|last| now < last + period) {
            return CycleOutcome::RateLimited;
        }
        self.last_update = Some(now);

        let sample = self.sensor.read();
        if !sample.is_valid() {
            debug!(?sample, "Ignoring out-of-range orientation sample");
            return CycleOutcome::InvalidSample(sample);
        }

        let settled = self
            .prev_fast
            .is_some_and(|previous| sample.settled_since(&previous, self.params.settle_threshold_deg));
        self.prev_fast = Some(sample);

        if !settled {
            return CycleOutcome::Moving(sample);
        }

        let outcome = if self.calibration.is_calibrated() {
            self.seek(Orientation::new(azimuth, elevation), sample)
        } else {
            self.calibrate(sample)
        };
        self.prev_stop = Some(sample);
        outcome
    }

    fn move_home(&mut self) -> CycleOutcome {
        self.move_to_az_el(self.params.home_azimuth_deg, self.params.home_elevation_deg)
    }

    fn reset_calibration(&mut self) {
        info!("Calibration reset, recalibrating on the next settled cycles");
        self.calibration = CalibrationState::AwaitingStep0;
    }

    fn override_field(&mut self, field: OverrideField, value: u16) -> Result<(), OverrideError> {
        if self.actuator.is_none() {
            return Err(OverrideError::ActuatorAbsent);
        }

        let motor = field.motor();
        let (min, max) = {
            let state = &self.motors[motor.index()];
            (state.min_pulse(), state.max_pulse())
        };
        match field {
            OverrideField::Position(_) => self.set_actuator_position(motor, value as f32),
            OverrideField::Min(_) => self.apply_limits(motor, value, max)?,
            OverrideField::Max(_) => self.apply_limits(motor, min, value)?,
        }

        info!(%field, value, "Override applied");
        self.persist();
        Ok(())
    }

    fn calibrate_fully(&mut self) -> Result<(), CalibrationError> {
        if self.actuator.is_none() {
            return Err(CalibrationError::ActuatorAbsent);
        }

        self.reset_calibration();

        let mut cycles = 0;
        while !self.calibration.is_calibrated() {
            if cycles >= self.params.max_calibration_cycles {
                warn!(cycles, "Calibration did not complete");
                return Err(CalibrationError::TimedOut { cycles });
            }

            self.move_home();
            self.clock.sleep(self.params.update_period());
            cycles += 1;
        }

        self.move_home();
        info!(cycles, "Full calibration finished");
        Ok(())
    }

    fn is_calibrating(&self) -> bool {
        self.calibration.in_progress()
    }

    fn status(&self) -> StatusReport {
        let report = |motor: &MotorState| MotorReport {
            position: motor.current_pulse(),
            min: motor.min_pulse(),
            max: motor.max_pulse(),
            at_endstop: motor.at_min() || motor.at_max(),
            az_degrees_per_us: 1.0 / motor.az_scale(),
            el_degrees_per_us: 1.0 / motor.el_scale(),
        };

        let pinned = |at_endstop: fn(&MotorState) -> bool| {
            MotorIndex::ALL
                .into_iter()
                .find(|motor| at_endstop(&self.motors[motor.index()]))
        };

        let status = if self.actuator.is_none() {
            GimbalStatus::NotFound
        } else if let Some(motor) = pinned(MotorState::at_min) {
            GimbalStatus::AtMin(motor)
        } else if let Some(motor) = pinned(MotorState::at_max) {
            GimbalStatus::AtMax(motor)
        } else if !self.calibration.is_calibrated() {
            GimbalStatus::Uncalibrated
        } else {
            GimbalStatus::Ok
        };

        StatusReport {
            motors: [report(&self.motors[0]), report(&self.motors[1])],
            calibration: self.calibration,
            calibrating: self.is_calibrating(),
            status,
        }
    }

    fn orientation(&mut self) -> Orientation {
        self.sensor.read()
    }

    fn temperature(&mut self) -> Option<f32> {
        self.sensor.temperature()
    }

    fn set_declination(&mut self, degrees: f32) -> Result<(), OverrideError> {
        if !degrees.is_finite() || degrees.abs() > MAX_DECLINATION_DEG {
            return Err(OverrideError::InvalidValue {
                field: "declination".to_string(),
                value: degrees.to_string(),
            });
        }

        self.sensor.set_declination(degrees);
        self.sensor_settings.declination_deg = Some(degrees);
        info!(degrees, "Magnetic declination set");
        self.persist();
        Ok(())
    }

    fn save_sensor_calibration(&mut self) -> Result<(), SensorError> {
        if !self.sensor.is_present() {
            return Err(SensorError::NotFound);
        }

        let offsets = self
            .sensor
            .offsets()
            .map_err(|e| SensorError::ReadFailed(e.to_string()))?;
        if offsets.is_blank() {
            return Err(SensorError::NothingToSave);
        }

        self.sensor_settings.offsets = Some(offsets.0);
        info!("Orientation sensor calibration saved");
        self.persist();
        Ok(())
    }

    fn sensor_status(&mut self) -> SensorReport {
        let declination = self
            .sensor_settings
            .declination_deg
            .unwrap_or_else(|| self.sensor.declination());

        SensorReport {
            found: self.sensor.is_present(),
            orientation: self.sensor.read(),
            temperature: self.sensor.temperature(),
            declination,
            health: self.sensor.health(),
        }
    }
}
