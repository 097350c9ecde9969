use thiserror::Error;

/// Errors raised by the messaging layer.
#[derive(Debug, Error)]
pub enum MessageError {
    /// An outbound message has no id and the transport could not generate one.
    #[error("Message is missing a required id: {message}")]
    MissingRequiredId { message: String },

    /// A header that must be present was not found.
    #[error("Missing required header: {0}")]
    MissingRequiredHeader(String),

    /// The payload could not be encoded or decoded.
    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying transport rejected the operation.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessageError>;
