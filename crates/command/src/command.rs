//! Typed commands and the per-dispatch command message.

use std::collections::HashMap;

use message::{Headers, Message};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::headers::CommandMessageHeaders;

/// Variables bound from a handler's resource pattern, e.g. `account_id`
/// for `/accounts/{account_id}`.
pub type PathVariables = HashMap<String, String>;

/// A command sent to another service.
///
/// `COMMAND_TYPE` is the discriminator carried in the `command_type` header;
/// handler lookup compares the two strings and nothing else.
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COMMAND_TYPE: &'static str;

    /// Builds a message carrying this command and its type header.
    fn to_message(&self) -> message::Result<Message> {
        Ok(Message::from_payload(self)?
            .with_header(CommandMessageHeaders::COMMAND_TYPE, Self::COMMAND_TYPE))
    }
}

/// A decoded command together with the raw message it arrived in.
///
/// Built once per inbound dispatch and dropped when the handler returns.
#[derive(Debug, Clone)]
pub struct CommandMessage<C> {
    command: C,
    message: Message,
    correlation_headers: Headers,
}

impl<C> CommandMessage<C> {
    pub fn new(command: C, message: Message, correlation_headers: Headers) -> Self {
        Self {
            command,
            message,
            correlation_headers,
        }
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    /// The raw inbound message, for header lookup.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Headers that every reply to this command will carry.
    pub fn correlation_headers(&self) -> &Headers {
        &self.correlation_headers
    }

    pub fn into_command(self) -> C {
        self.command
    }
}
