//! Saga error types.

use common::SagaId;
use message::MessageError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A local step action failed. Raised by step code; turned into a
    /// direction switch when it happens while going forward.
    #[error("Local step failed: {0}")]
    LocalStep(String),

    /// A step was asked for an action it does not define.
    #[error("Saga step '{step}' has no {direction} action")]
    StepNotApplicable {
        step: String,
        direction: &'static str,
    },

    /// A compensation step failed; the saga cannot be rolled back further.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// No saga instance with this id is known to the manager.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// A reply message is missing headers or carries unexpected values.
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// Messaging error.
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
