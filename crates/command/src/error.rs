//! Command dispatching error types.

use message::MessageError;
use thiserror::Error;

/// Errors that can occur while dispatching commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No registered handler matches the inbound message.
    #[error("No command handler for command type '{command_type}' on channel '{channel}'")]
    MissingCommandHandler {
        command_type: String,
        channel: String,
    },

    /// Messaging error (missing header, decode failure, transport failure).
    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

/// Convenience type alias for command results.
pub type Result<T> = std::result::Result<T, CommandError>;
