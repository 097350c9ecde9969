//! Messaging layer for the saga orchestration core.
//!
//! Provides the [`Message`] envelope with copy-on-write [`Headers`], the
//! transport seams ([`MessageProducer`], [`MessageConsumer`]), the
//! [`OutboundMessageProducer`] that stamps id, destination and date on every
//! outgoing message, and an [`InMemoryTransport`] for tests and local wiring.

pub mod consumer;
pub mod error;
pub mod headers;
pub mod memory;
pub mod message;
pub mod producer;

pub use consumer::{MessageConsumer, MessageHandler, handler_fn};
pub use error::{MessageError, Result};
pub use headers::Headers;
pub use memory::{InMemoryTransport, SentMessage};
pub use message::Message;
pub use producer::{MessageProducer, OutboundMessageProducer};
