use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bno055::{CalibrationStatus, Diagnostics, OFFSET_BYTES, SelfTest, SensorOffsets, SystemStatus};

use crate::{
    controller::{
        config::ControllerConfig,
        gimbal::GimbalController,
        interfaces::{Actuator, Clock, OrientationSensor, PersistentStore},
        motor::MotorIndex,
        orientation::Orientation,
        status::SensorHealth,
    },
    store::CalibrationRecord,
};

/// Replays queued samples, then repeats the last one forever.
///
/// Also stands in for the sensor's own calibration: a fully calibrated, self-tested chip
/// whose offset block starts out blank.
#[derive(Clone)]
pub struct ScriptedSensor {
    samples: Arc<Mutex<VecDeque<Orientation>>>,
    last: Arc<Mutex<Orientation>>,
    temperature: Option<f32>,
    declination: Arc<Mutex<f32>>,
    offsets: Arc<Mutex<SensorOffsets>>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::new())),
            last: Arc::new(Mutex::new(Orientation::unavailable())),
            temperature: Some(31.0),
            declination: Arc::new(Mutex::new(0.0)),
            offsets: Arc::new(Mutex::new(SensorOffsets([0; OFFSET_BYTES]))),
        }
    }

    pub fn set_offsets(&self, raw: [u8; OFFSET_BYTES]) {
        *self.offsets.lock().unwrap() = SensorOffsets(raw);
    }

    pub fn current_offsets(&self) -> SensorOffsets {
        *self.offsets.lock().unwrap()
    }

    pub fn applied_declination(&self) -> f32 {
        *self.declination.lock().unwrap()
    }

    pub fn push(&self, azimuth: f32, elevation: f32) {
        self.samples
            .lock()
            .unwrap()
            .push_back(Orientation::new(azimuth, elevation));
    }

    pub fn push_times(&self, azimuth: f32, elevation: f32, times: usize) {
        for _ in 0..times {
            self.push(azimuth, elevation);
        }
    }
}

impl OrientationSensor for ScriptedSensor {
    fn read(&mut self) -> Orientation {
        let mut last = self.last.lock().unwrap();
        if let Some(sample) = self.samples.lock().unwrap().pop_front() {
            *last = sample;
        }
        *last
    }

    fn temperature(&mut self) -> Option<f32> {
        self.temperature
    }

    fn health(&mut self) -> Option<SensorHealth> {
        Some(SensorHealth {
            calibration: CalibrationStatus::from(0xFF),
            diagnostics: Diagnostics {
                status: SystemStatus::FusionRunning,
                self_test: SelfTest::all(),
                error: 0,
            },
        })
    }

    fn declination(&self) -> f32 {
        self.applied_declination()
    }

    fn set_declination(&mut self, degrees: f32) {
        *self.declination.lock().unwrap() = degrees;
    }

    fn offsets(&mut self) -> io::Result<SensorOffsets> {
        Ok(self.current_offsets())
    }

    fn install_offsets(&mut self, offsets: &SensorOffsets) -> io::Result<()> {
        *self.offsets.lock().unwrap() = *offsets;
        Ok(())
    }
}

/// Records every pulse together with the (manual) time it was sent.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    commands: Arc<Mutex<Vec<(Instant, MotorIndex, u16)>>>,
    clock: ManualClock,
}

impl RecordingActuator {
    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            commands: Arc::default(),
            clock,
        }
    }

    pub fn commands(&self) -> Vec<(MotorIndex, u16)> {
        self.timed_commands()
            .into_iter()
            .map(|(_, motor, pulse)| (motor, pulse))
            .collect()
    }

    pub fn timed_commands(&self) -> Vec<(Instant, MotorIndex, u16)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn last_for(&self, motor: MotorIndex) -> Option<u16> {
        self.commands()
            .into_iter()
            .rev()
            .find(|(m, _)| *m == motor)
            .map(|(_, pulse)| pulse)
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }
}

impl Actuator for RecordingActuator {
    fn set_pulse(&mut self, motor: MotorIndex, micros: u16) {
        let now = self.clock.now();
        self.commands.lock().unwrap().push((now, motor, micros));
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    record: Arc<Mutex<Option<CalibrationRecord>>>,
    saves: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn with_record(record: CalibrationRecord) -> Self {
        let store = Self::default();
        *store.record.lock().unwrap() = Some(record);
        store
    }

    pub fn record(&self) -> Option<CalibrationRecord> {
        self.record.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl PersistentStore for MemoryStore {
    fn load(&mut self) -> io::Result<CalibrationRecord> {
        self.record()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "nothing stored"))
    }

    fn save(&mut self, record: &CalibrationRecord) -> io::Result<()> {
        *self.record.lock().unwrap() = Some(record.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

/// Time only moves when a test advances it or the code under test sleeps.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

pub type TestController = GimbalController<ScriptedSensor, RecordingActuator, MemoryStore, ManualClock>;

/// Shared handles onto the doubles plugged into a controller.
pub struct Rig {
    pub sensor: ScriptedSensor,
    pub actuator: RecordingActuator,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub config: ControllerConfig,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::default())
    }

    pub fn with_record(record: CalibrationRecord) -> Self {
        Self::with_store(MemoryStore::with_record(record))
    }

    fn with_store(store: MemoryStore) -> Self {
        let clock = ManualClock::new();
        Self {
            sensor: ScriptedSensor::new(),
            actuator: RecordingActuator::with_clock(clock.clone()),
            store,
            clock,
            config: ControllerConfig::default(),
        }
    }

    pub fn controller(&self) -> TestController {
        GimbalController::new(
            self.sensor.clone(),
            Some(self.actuator.clone()),
            self.store.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    pub fn controller_without_actuator(&self) -> TestController {
        GimbalController::new(
            self.sensor.clone(),
            None,
            self.store.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    /// Lets a full update period pass, so the next cycle is never rate limited.
    pub fn tick(&self) {
        self.clock.advance(self.config.update_period());
    }
}
