#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid value '{value}' for {field}")]
    InvalidValue { field: String, value: String },

    #[error("Lower limit {min} must be below upper limit {max}")]
    InvalidLimits { min: u16, max: u16 },

    #[error("No gimbal!")]
    ActuatorAbsent,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("No gimbal!")]
    ActuatorAbsent,

    #[error("Calibration did not complete within {cycles} control cycles")]
    TimedOut { cycles: u32 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor not found!")]
    NotFound,

    #[error("Failed to read sensor calibration: {0}")]
    ReadFailed(String),

    #[error("Sensor has no calibration to save")]
    NothingToSave,
}
