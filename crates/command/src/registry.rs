//! Registry of command handlers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use message::Message;

use crate::command::PathVariables;
use crate::handler::CommandHandler;
use crate::headers::CommandMessageHeaders;

/// All handlers of one service, keyed by `(channel, command type)`.
///
/// Several handlers may share a key when they declare different resource
/// patterns; they are tried in registration order.
#[derive(Debug, Default)]
pub struct CommandHandlers {
    handlers: Vec<Arc<CommandHandler>>,
    by_key: HashMap<(String, String), Vec<usize>>,
}

impl CommandHandlers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler.
    pub fn register(&mut self, handler: CommandHandler) {
        let key = (
            handler.channel().to_string(),
            handler.command_type().to_string(),
        );
        self.by_key
            .entry(key)
            .or_default()
            .push(self.handlers.len());
        self.handlers.push(Arc::new(handler));
    }

    /// Registers a handler, builder style.
    pub fn with(mut self, handler: CommandHandler) -> Self {
        self.register(handler);
        self
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns every channel with at least one handler, sorted and deduplicated.
    pub fn channels(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|h| h.channel().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Finds the handler for an inbound message.
    ///
    /// The consumption channel is the message's `destination` header. A message
    /// without one is matched against handlers on every channel.
    pub fn find_target_method(
        &self,
        message: &Message,
    ) -> Option<(Arc<CommandHandler>, PathVariables)> {
        let command_type = message.header(CommandMessageHeaders::COMMAND_TYPE)?;

        let mut candidates: Box<dyn Iterator<Item = &Arc<CommandHandler>>> =
            match message.header(Message::DESTINATION) {
                Some(channel) => {
                    let key = (channel.to_string(), command_type.to_string());
                    let indices = self.by_key.get(&key)?;
                    Box::new(indices.iter().map(|&i| &self.handlers[i]))
                }
                None => Box::new(self.handlers.iter()),
            };

        candidates.find_map(|h| h.path_variables(message).map(|vars| (Arc::clone(h), vars)))
    }
}
