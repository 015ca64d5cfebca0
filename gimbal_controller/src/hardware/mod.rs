//! Raspberry Pi bindings for the controller's sensor, actuator and clock seams.

use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use bno055::{Bno055, EulerAngles, OperatingMode, SensorOffsets};
use pca9685::Pca9685;
use rppal::i2c::I2c;
use tracing::{info, warn};

use crate::controller::{
    interfaces::{Actuator, Clock, OrientationSensor},
    motor::MotorIndex,
    orientation::Orientation,
    status::SensorHealth,
};

pub mod config;

pub use config::HardwareConfig;

/// An I2C bus bound to one slave address, exposed as a byte stream.
pub struct I2cStream {
    i2c: I2c,
}

impl I2cStream {
    pub fn open(bus: u8, address: u16) -> io::Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(io::Error::other)?;
        i2c.set_slave_address(address).map_err(io::Error::other)?;
        Ok(Self { i2c })
    }
}

impl Read for I2cStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.i2c.read(buf).map_err(io::Error::other)
    }
}

impl Write for I2cStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.i2c.write(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct ServoBank<B> {
    bus: B,
    driver: Pca9685,
    channels: [u8; 2],
}

impl ServoBank<I2cStream> {
    /// Fails when the PWM chip does not answer, which the controller treats as "no gimbal".
    pub fn open(config: &HardwareConfig) -> io::Result<Self> {
        let bus = I2cStream::open(config.i2c_bus, config.servo_driver_address)?;
        let bank = Self::new(bus, Pca9685::new(config.servo_frequency_hz), config.servo_channels)?;
        info!(
            address = config.servo_driver_address,
            frequency_hz = config.servo_frequency_hz,
            "Servo driver ready"
        );
        Ok(bank)
    }
}

impl<B: Read + Write> ServoBank<B> {
    pub fn new(mut bus: B, driver: Pca9685, channels: [u8; 2]) -> io::Result<Self> {
        driver.init(&mut bus)?;
        Ok(Self {
            bus,
            driver,
            channels,
        })
    }
}

impl<B: Read + Write> Actuator for ServoBank<B> {
    fn set_pulse(&mut self, motor: MotorIndex, micros: u16) {
        let channel = self.channels[motor.index()];
        if let Err(e) = self
            .driver
            .set_pulse_width_us(&mut self.bus, channel, micros)
        {
            warn!(%motor, channel, micros, "Failed to set servo pulse: {}", e);
        }
    }
}

/// Converts a fused heading/pitch reading into antenna azimuth and elevation.
///
/// The sensor faces backwards on the mount, so headings are turned by half a revolution.
pub fn orientation_from_euler(euler: &EulerAngles, declination: f32) -> Orientation {
    let azimuth = (euler.heading + declination + 540.0).rem_euclid(360.0);
    Orientation::new(azimuth, euler.pitch)
}

const SENSOR_MODE: OperatingMode = OperatingMode::Ndof;

pub struct OrientationReader<B> {
    bus: B,
    sensor: Bno055,
    declination: f32,
}

impl OrientationReader<I2cStream> {
    pub fn open(config: &HardwareConfig) -> io::Result<Self> {
        let bus = I2cStream::open(config.i2c_bus, config.sensor_address)?;
        Self::new(bus, config.magnetic_declination_deg)
    }
}

impl<B: Read + Write> OrientationReader<B> {
    pub fn new(mut bus: B, declination: f32) -> io::Result<Self> {
        let sensor = Bno055::new();
        sensor.begin(&mut bus, SENSOR_MODE)?;

        let diagnostics = sensor.diagnostics(&mut bus)?;
        let calibration = sensor.calibration_status(&mut bus)?;
        if !diagnostics.self_test.passed() {
            warn!(?diagnostics, "Orientation sensor self test failed");
        }
        info!(
            status = ?diagnostics.status,
            ?calibration,
            "Orientation sensor ready"
        );

        Ok(Self {
            bus,
            sensor,
            declination,
        })
    }
}

impl<B: Read + Write> OrientationSensor for OrientationReader<B> {
    fn read(&mut self) -> Orientation {
        match self.sensor.euler(&mut self.bus) {
            Ok(euler) => orientation_from_euler(&euler, self.declination),
            Err(e) => {
                warn!("Failed to read orientation: {}", e);
                Orientation::unavailable()
            }
        }
    }

    fn temperature(&mut self) -> Option<f32> {
        match self.sensor.temperature(&mut self.bus) {
            Ok(celsius) => Some(f32::from(celsius)),
            Err(e) => {
                warn!("Failed to read sensor temperature: {}", e);
                None
            }
        }
    }

    fn health(&mut self) -> Option<SensorHealth> {
        let health = self
            .sensor
            .calibration_status(&mut self.bus)
            .and_then(|calibration| {
                let diagnostics = self.sensor.diagnostics(&mut self.bus)?;
                Ok(SensorHealth {
                    calibration,
                    diagnostics,
                })
            });

        match health {
            Ok(health) => Some(health),
            Err(e) => {
                warn!("Failed to read sensor status: {}", e);
                None
            }
        }
    }

    fn declination(&self) -> f32 {
        self.declination
    }

    fn set_declination(&mut self, degrees: f32) {
        self.declination = degrees;
    }

    fn offsets(&mut self) -> io::Result<SensorOffsets> {
        self.sensor.read_offsets(&mut self.bus, SENSOR_MODE)
    }

    fn install_offsets(&mut self, offsets: &SensorOffsets) -> io::Result<()> {
        self.sensor
            .write_offsets(&mut self.bus, offsets, SENSOR_MODE)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
