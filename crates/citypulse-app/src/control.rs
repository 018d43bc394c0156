use citypulse_core::{CommandError, SimCommand, SpeedMultiplier};
use crossfire::TrySendError;
use thiserror::Error;
use tracing::warn;

use crate::command::CommandSender;

/// Errors produced when handing a command to the simulation worker.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("command queue is full; retry later")]
    CommandQueueFull,
    #[error("command queue has been closed")]
    CommandQueueClosed,
    #[error(transparent)]
    InvalidCommand(#[from] CommandError),
}

/// Cloneable handle used by operator surfaces to steer the running simulation.
///
/// Commands are queued and applied by the worker between ticks.
#[derive(Clone)]
pub struct ControlHandle {
    commands: CommandSender,
}

impl ControlHandle {
    pub fn new(commands: CommandSender) -> Self {
        Self { commands }
    }

    pub fn start(&self) -> Result<(), ControlError> {
        self.enqueue(SimCommand::Start)
    }

    pub fn pause(&self) -> Result<(), ControlError> {
        self.enqueue(SimCommand::Pause)
    }

    pub fn set_speed(&self, speed: SpeedMultiplier) -> Result<(), ControlError> {
        self.enqueue(SimCommand::SetSpeed(speed))
    }

    /// Trigger the optimization protocol. Repeated calls are harmless.
    pub fn optimize_productivity(&self) -> Result<(), ControlError> {
        self.enqueue(SimCommand::ActivateProtocol)
    }

    pub fn submit(&self, command: SimCommand) -> Result<(), ControlError> {
        self.enqueue(command)
    }

    /// Decode and queue a JSON boundary command.
    ///
    /// Malformed input never reaches the worker; it is logged and returned as
    /// [`ControlError::InvalidCommand`].
    pub fn submit_raw(&self, raw: &str) -> Result<(), ControlError> {
        let command = SimCommand::decode(raw).inspect_err(|err| {
            warn!(%err, raw, "ignoring malformed control command");
        })?;
        self.enqueue(command)
    }

    fn enqueue(&self, command: SimCommand) -> Result<(), ControlError> {
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_msg)) => Err(ControlError::CommandQueueFull),
            Err(TrySendError::Disconnected(_msg)) => Err(ControlError::CommandQueueClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::create_command_bus;

    #[test]
    fn raw_commands_are_decoded_before_queueing() {
        let (sender, receiver) = create_command_bus(4);
        let handle = ControlHandle::new(sender);
        handle
            .submit_raw(r#"{"type":"speed","value":2}"#)
            .expect("valid command");
        assert_eq!(
            handle.submit_raw(r#"{"type":"speed","value":3}"#),
            Err(ControlError::InvalidCommand(CommandError::UnsupportedSpeed(3.0)))
        );
        assert!(matches!(
            handle.submit_raw(r#"{"type":"selfDestruct"}"#),
            Err(ControlError::InvalidCommand(CommandError::Malformed(_)))
        ));

        assert_eq!(
            receiver.try_recv().ok(),
            Some(SimCommand::SetSpeed(SpeedMultiplier::X2))
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn full_queue_is_reported() {
        let (sender, _receiver) = create_command_bus(1);
        let handle = ControlHandle::new(sender);
        handle.start().expect("first command fits");
        assert_eq!(handle.pause(), Err(ControlError::CommandQueueFull));
    }

    #[test]
    fn closed_queue_is_reported() {
        let (sender, receiver) = create_command_bus(4);
        let handle = ControlHandle::new(sender);
        drop(receiver);
        assert_eq!(
            handle.optimize_productivity(),
            Err(ControlError::CommandQueueClosed)
        );
    }
}
