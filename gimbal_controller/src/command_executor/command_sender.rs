use utilities::command_executor::{CommandSender, ExecutorError};

use crate::{
    command_executor::commands::{CommandResponse, GimbalCommand, GimbalError},
    controller::{
        CycleOutcome, OverrideField,
        orientation::Orientation,
        status::{SensorReport, StatusReport},
    },
};

pub type SendResult<T> = Result<T, ExecutorError<GimbalError>>;

#[derive(Clone)]
pub struct GimbalCommandSender {
    sender: CommandSender<GimbalCommand>,
}

impl GimbalCommandSender {
    pub fn new(sender: CommandSender<GimbalCommand>) -> Self {
        Self { sender }
    }

    async fn cycle(&self, command: GimbalCommand) -> SendResult<CycleOutcome> {
        match self.sender.send_command(command).await? {
            CommandResponse::Cycle(outcome) => Ok(outcome),
            _ => Err(ExecutorError::UnexpectedResponse),
        }
    }

    async fn unit(&self, command: GimbalCommand) -> SendResult<()> {
        match self.sender.send_command(command).await? {
            CommandResponse::Ok => Ok(()),
            _ => Err(ExecutorError::UnexpectedResponse),
        }
    }

    pub async fn move_to_az_el(&self, azimuth: f32, elevation: f32) -> SendResult<CycleOutcome> {
        self.cycle(GimbalCommand::MoveToAzEl { azimuth, elevation })
            .await
    }

    pub async fn move_home(&self) -> SendResult<CycleOutcome> {
        self.cycle(GimbalCommand::MoveHome).await
    }

    pub async fn reset_calibration(&self) -> SendResult<()> {
        self.unit(GimbalCommand::ResetCalibration).await
    }

    pub async fn override_field(&self, field: OverrideField, value: u16) -> SendResult<()> {
        self.unit(GimbalCommand::Override { field, value }).await
    }

    pub async fn calibrate(&self) -> SendResult<()> {
        self.unit(GimbalCommand::Calibrate).await
    }

    pub async fn status(&self) -> SendResult<StatusReport> {
        match self.sender.send_command(GimbalCommand::Status).await? {
            CommandResponse::Status(report) => Ok(report),
            _ => Err(ExecutorError::UnexpectedResponse),
        }
    }

    pub async fn orientation(&self) -> SendResult<Orientation> {
        match self.sender.send_command(GimbalCommand::Orientation).await? {
            CommandResponse::Orientation(orientation) => Ok(orientation),
            _ => Err(ExecutorError::UnexpectedResponse),
        }
    }

    pub async fn temperature(&self) -> SendResult<Option<f32>> {
        match self.sender.send_command(GimbalCommand::Temperature).await? {
            CommandResponse::Temperature(celsius) => Ok(celsius),
            _ => Err(ExecutorError::UnexpectedResponse),
        }
    }

    pub async fn set_declination(&self, degrees: f32) -> SendResult<()> {
        self.unit(GimbalCommand::SetDeclination(degrees)).await
    }

    pub async fn save_sensor_calibration(&self) -> SendResult<()> {
        self.unit(GimbalCommand::SaveSensorCalibration).await
    }

    pub async fn sensor_status(&self) -> SendResult<SensorReport> {
        match self.sender.send_command(GimbalCommand::SensorStatus).await? {
            CommandResponse::Sensor(report) => Ok(report),
            _ => Err(ExecutorError::UnexpectedResponse),
        }
    }
}
