use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub i2c_bus: u8,
    pub servo_driver_address: u16,
    pub servo_frequency_hz: f32,
    /// PWM channels driving the first and second servo.
    pub servo_channels: [u8; 2],
    pub sensor_address: u16,
    /// Added to the magnetic heading to obtain true azimuth.
    pub magnetic_declination_deg: f32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            servo_driver_address: pca9685::DEFAULT_ADDRESS,
            servo_frequency_hz: 50.0,
            servo_channels: [0, 1],
            sensor_address: bno055::DEFAULT_ADDRESS,
            magnetic_declination_deg: 13.23,
        }
    }
}

impl HardwareConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(channel) = self
            .servo_channels
            .iter()
            .find(|channel| **channel >= pca9685::CHANNELS)
        {
            return Err(format!("hardware.servo_channels: channel {} does not exist", channel));
        }
        if self.servo_channels[0] == self.servo_channels[1] {
            return Err("hardware.servo_channels must name two different channels".to_string());
        }
        if !(self.servo_frequency_hz > 0.0) {
            return Err("hardware.servo_frequency_hz must be positive".to_string());
        }
        Ok(())
    }
}
