use utilities::command_executor::DeviceHandler;

use crate::controller::Gimbal;

pub mod command_sender;
pub mod commands;

/// Owns the controller on the executor thread.
pub struct GimbalHandler {
    gimbal: Box<dyn Gimbal + Send>,
}

impl GimbalHandler {
    pub fn new(gimbal: impl Gimbal + Send + 'static) -> Self {
        Self {
            gimbal: Box::new(gimbal),
        }
    }

    pub fn gimbal(&mut self) -> &mut (dyn Gimbal + Send) {
        self.gimbal.as_mut()
    }
}

impl DeviceHandler for GimbalHandler {
    type Command = commands::GimbalCommand;
}
