use std::{
    fmt::Display,
    sync::mpsc::{Receiver, Sender},
    thread::JoinHandle,
};

use tokio::sync::oneshot;
use tracing::{debug, warn};

pub trait Command: Send + 'static {
    type Response: Send + 'static;
    type Error: Display + Send + 'static;
    type Handler: DeviceHandler<Command = Self>;

    fn execute(self, handler: &mut Self::Handler) -> Result<Self::Response, Self::Error>;
}

pub trait DeviceHandler {
    type Command: Command<Handler = Self>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError<E> {
    #[error("command executor is not running")]
    Disconnected,
    #[error("command executor dropped the response")]
    NoResponse,
    #[error("unexpected response type")]
    UnexpectedResponse,
    #[error("{0}")]
    Command(E),
}

pub struct GenericCommand<C: Command> {
    command: C,
    response_ch: oneshot::Sender<Result<C::Response, C::Error>>,
}

impl<C: Command> GenericCommand<C> {
    pub fn new(command: C, response_ch: oneshot::Sender<Result<C::Response, C::Error>>) -> Self {
        Self {
            command,
            response_ch,
        }
    }

    pub fn execute(self, handler: &mut C::Handler) {
        let result = self.command.execute(handler);

        if let Err(e) = &result {
            warn!("Command failed: {}", e);
        }

        if self.response_ch.send(result).is_err() {
            debug!("Requester went away before the response was delivered");
        }
    }
}

/// Serializes every command for one device onto a single blocking thread.
pub struct CommandExecutor<H: DeviceHandler + Send + 'static> {
    handler: H,
    commands_ch: Receiver<GenericCommand<H::Command>>,
    sender: Sender<GenericCommand<H::Command>>,
}

impl<H: DeviceHandler + Send + 'static> CommandExecutor<H> {
    pub fn new(handler: H) -> Self {
        let (sender, commands_ch) = std::sync::mpsc::channel();

        Self {
            handler,
            commands_ch,
            sender,
        }
    }

    pub fn sender(&self) -> CommandSender<H::Command> {
        CommandSender::new(self.sender.clone())
    }

    /// Runs until every [`CommandSender`] is dropped, then hands the device back.
    pub fn run(self) -> H {
        let Self {
            mut handler,
            commands_ch,
            sender,
        } = self;
        drop(sender);

        while let Ok(command) = commands_ch.recv() {
            command.execute(&mut handler);
        }

        debug!("All command senders dropped, executor stopping");
        handler
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<H>> {
        std::thread::Builder::new()
            .name("command-executor".into())
            .spawn(move || self.run())
    }
}

pub struct CommandSender<C: Command> {
    commands_ch: Sender<GenericCommand<C>>,
}

impl<C: Command> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self {
            commands_ch: self.commands_ch.clone(),
        }
    }
}

impl<C: Command> CommandSender<C> {
    pub fn new(commands_ch: Sender<GenericCommand<C>>) -> Self {
        Self { commands_ch }
    }

    fn enqueue(
        &self,
        command: C,
    ) -> Result<oneshot::Receiver<Result<C::Response, C::Error>>, ExecutorError<C::Error>> {
        let (response_ch, response_rx) = oneshot::channel();

        self.commands_ch
            .send(GenericCommand::new(command, response_ch))
            .map_err(|_| ExecutorError::Disconnected)?;

        Ok(response_rx)
    }

    pub async fn send_command(&self, command: C) -> Result<C::Response, ExecutorError<C::Error>> {
        self.enqueue(command)?
            .await
            .map_err(|_| ExecutorError::NoResponse)?
            .map_err(ExecutorError::Command)
    }

    /// Must not be called from inside an async context.
    pub fn blocking_send_command(&self, command: C) -> Result<C::Response, ExecutorError<C::Error>> {
        self.enqueue(command)?
            .blocking_recv()
            .map_err(|_| ExecutorError::NoResponse)?
            .map_err(ExecutorError::Command)
    }
}
