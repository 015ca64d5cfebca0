use std::{
    io,
    time::{Duration, Instant},
};

use bno055::SensorOffsets;

use crate::{
    controller::{motor::MotorIndex, orientation::Orientation, status::SensorHealth},
    store::CalibrationRecord,
};

pub trait OrientationSensor {
    /// Samples outside the valid azimuth/elevation ranges (including NaN) mark a failed read.
    fn read(&mut self) -> Orientation;

    fn temperature(&mut self) -> Option<f32> {
        None
    }

    fn is_present(&self) -> bool {
        true
    }

    fn health(&mut self) -> Option<SensorHealth> {
        None
    }

    /// Degrees added to the magnetic heading to get true azimuth.
    fn declination(&self) -> f32 {
        0.0
    }

    fn set_declination(&mut self, _degrees: f32) {}

    fn offsets(&mut self) -> io::Result<SensorOffsets> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn install_offsets(&mut self, _offsets: &SensorOffsets) -> io::Result<()> {
        Ok(())
    }
}

/// An absent sensor reports nothing but invalid samples.
impl<T: OrientationSensor> OrientationSensor for Option<T> {
    fn read(&mut self) -> Orientation {
        match self {
            Some(sensor) => sensor.read(),
            None => Orientation::unavailable(),
        }
    }

    fn temperature(&mut self) -> Option<f32> {
        self.as_mut().and_then(|sensor| sensor.temperature())
    }

    fn is_present(&self) -> bool {
        self.is_some()
    }

    fn health(&mut self) -> Option<SensorHealth> {
        self.as_mut().and_then(|sensor| sensor.health())
    }

    fn declination(&self) -> f32 {
        self.as_ref().map_or(0.0, |sensor| sensor.declination())
    }

    fn set_declination(&mut self, degrees: f32) {
        if let Some(sensor) = self {
            sensor.set_declination(degrees);
        }
    }

    fn offsets(&mut self) -> io::Result<SensorOffsets> {
        match self {
            Some(sensor) => sensor.offsets(),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "orientation sensor not found")),
        }
    }

    fn install_offsets(&mut self, offsets: &SensorOffsets) -> io::Result<()> {
        match self {
            Some(sensor) => sensor.install_offsets(offsets),
            None => Ok(()),
        }
    }
}

pub trait Actuator {
    fn set_pulse(&mut self, motor: MotorIndex, micros: u16);
}

pub trait PersistentStore {
    fn load(&mut self) -> io::Result<CalibrationRecord>;
    fn save(&mut self, record: &CalibrationRecord) -> io::Result<()>;
}

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}
