use utilities::command_executor::Command;

use crate::{
    command_executor::GimbalHandler,
    controller::{
        CycleOutcome, OverrideField,
        error::{CalibrationError, OverrideError, SensorError},
        orientation::Orientation,
        status::{SensorReport, StatusReport},
    },
};

#[derive(Debug, Clone)]
pub enum GimbalCommand {
    MoveToAzEl { azimuth: f32, elevation: f32 },
    MoveHome,
    ResetCalibration,
    Override { field: OverrideField, value: u16 },
    Calibrate,
    Status,
    Orientation,
    Temperature,
    SetDeclination(f32),
    SaveSensorCalibration,
    SensorStatus,
}

#[derive(Debug)]
pub enum CommandResponse {
    Cycle(CycleOutcome),
    Status(StatusReport),
    Orientation(Orientation),
    Temperature(Option<f32>),
    Sensor(SensorReport),
    Ok,
}

#[derive(Debug, thiserror::Error)]
pub enum GimbalError {
    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Sensor(#[from] SensorError),
}

impl Command for GimbalCommand {
    type Response = CommandResponse;
    type Error = GimbalError;
    type Handler = GimbalHandler;

    fn execute(self, handler: &mut Self::Handler) -> Result<Self::Response, Self::Error> {
        let gimbal = handler.gimbal();
        match self {
            GimbalCommand::MoveToAzEl { azimuth, elevation } => {
                Ok(CommandResponse::Cycle(gimbal.move_to_az_el(azimuth, elevation)))
            }
            GimbalCommand::MoveHome => Ok(CommandResponse::Cycle(gimbal.move_home())),
            GimbalCommand::ResetCalibration => {
                gimbal.reset_calibration();
                Ok(CommandResponse::Ok)
            }
            GimbalCommand::Override { field, value } => {
                gimbal.override_field(field, value)?;
                Ok(CommandResponse::Ok)
            }
            GimbalCommand::Calibrate => {
                gimbal.calibrate_fully()?;
                Ok(CommandResponse::Ok)
            }
            GimbalCommand::Status => Ok(CommandResponse::Status(gimbal.status())),
            GimbalCommand::Orientation => Ok(CommandResponse::Orientation(gimbal.orientation())),
            GimbalCommand::Temperature => Ok(CommandResponse::Temperature(gimbal.temperature())),
            GimbalCommand::SetDeclination(degrees) => {
                gimbal.set_declination(degrees)?;
                Ok(CommandResponse::Ok)
            }
            GimbalCommand::SaveSensorCalibration => {
                gimbal.save_sensor_calibration()?;
                Ok(CommandResponse::Ok)
            }
            GimbalCommand::SensorStatus => Ok(CommandResponse::Sensor(gimbal.sensor_status())),
        }
    }
}
