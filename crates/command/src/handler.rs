//! Command handlers and their matching rules.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use message::{Headers, Message};

use crate::command::{Command, CommandMessage, PathVariables};
use crate::headers::CommandMessageHeaders;
use crate::outcome::HandlerOutcome;
use crate::reply::ReplyLock;

/// Per-handler options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Attach a [`ReplyLock`] token to every reply.
    pub with_lock: bool,
    /// A pre-lock function computes the lock target instead of the payload hash.
    pub has_pre_lock: bool,
}

/// Result of running a handler against one inbound message.
pub(crate) struct Invocation {
    pub outcome: HandlerOutcome,
    pub lock: Option<ReplyLock>,
}

#[async_trait]
trait Invoke: Send + Sync {
    async fn invoke(
        &self,
        message: &Message,
        correlation_headers: Headers,
        path_variables: PathVariables,
    ) -> message::Result<Invocation>;
}

type PreLock<C> = Arc<dyn Fn(&C) -> String + Send + Sync>;

struct TypedInvoker<C, F> {
    handler: F,
    with_lock: bool,
    pre_lock: Option<PreLock<C>>,
    _command: PhantomData<fn() -> C>,
}

#[async_trait]
impl<C, F, Fut> Invoke for TypedInvoker<C, F>
where
    C: Command,
    F: Fn(CommandMessage<C>, PathVariables) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    async fn invoke(
        &self,
        message: &Message,
        correlation_headers: Headers,
        path_variables: PathVariables,
    ) -> message::Result<Invocation> {
        let command: C = message.decode()?;

        let lock = self.with_lock.then(|| match &self.pre_lock {
            Some(pre_lock) => ReplyLock::for_target(pre_lock(&command)),
            None => ReplyLock::for_payload(C::COMMAND_TYPE, message.payload()),
        });

        let command_message = CommandMessage::new(command, message.clone(), correlation_headers);
        let outcome = (self.handler)(command_message, path_variables).await;
        Ok(Invocation { outcome, lock })
    }
}

/// A handler registered for one command type on one channel.
///
/// Immutable once built; the registry shares it behind an `Arc`.
pub struct CommandHandler {
    channel: String,
    command_type: &'static str,
    resource: Option<String>,
    options: HandlerOptions,
    invoker: Box<dyn Invoke>,
}

impl CommandHandler {
    /// Starts building a handler for command type `C` on `channel`.
    pub fn builder<C: Command>(channel: impl Into<String>) -> CommandHandlerBuilder<C> {
        CommandHandlerBuilder {
            channel: channel.into(),
            resource: None,
            with_lock: false,
            pre_lock: None,
            _command: PhantomData,
        }
    }

    /// Builds a handler with default options.
    pub fn new<C, F, Fut>(channel: impl Into<String>, handler: F) -> Self
    where
        C: Command,
        F: Fn(CommandMessage<C>, PathVariables) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        Self::builder::<C>(channel).handle(handler)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn command_type(&self) -> &'static str {
        self.command_type
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn options(&self) -> HandlerOptions {
        self.options
    }

    /// Returns true if this handler accepts `message`.
    pub fn handles(&self, message: &Message) -> bool {
        self.path_variables(message).is_some()
    }

    /// Matches `message` against the command type and resource pattern,
    /// returning the bound path variables on success.
    pub fn path_variables(&self, message: &Message) -> Option<PathVariables> {
        if message.header(CommandMessageHeaders::COMMAND_TYPE) != Some(self.command_type) {
            return None;
        }
        match &self.resource {
            None => Some(PathVariables::new()),
            Some(pattern) => {
                let resource = message.header(CommandMessageHeaders::RESOURCE)?;
                match_resource(pattern, resource)
            }
        }
    }

    pub(crate) async fn invoke(
        &self,
        message: &Message,
        correlation_headers: Headers,
        path_variables: PathVariables,
    ) -> message::Result<Invocation> {
        self.invoker
            .invoke(message, correlation_headers, path_variables)
            .await
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("channel", &self.channel)
            .field("command_type", &self.command_type)
            .field("resource", &self.resource)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CommandHandler`].
pub struct CommandHandlerBuilder<C: Command> {
    channel: String,
    resource: Option<String>,
    with_lock: bool,
    pre_lock: Option<PreLock<C>>,
    _command: PhantomData<fn() -> C>,
}

impl<C: Command> CommandHandlerBuilder<C> {
    /// Restricts the handler to messages whose resource header matches
    /// `pattern`, e.g. `/accounts/{account_id}`.
    pub fn resource(mut self, pattern: impl Into<String>) -> Self {
        self.resource = Some(pattern.into());
        self
    }

    /// Attaches a lock token derived from the command to every reply.
    pub fn with_lock(mut self) -> Self {
        self.with_lock = true;
        self
    }

    /// Derives the lock target from the command instead of hashing its payload.
    /// Implies [`with_lock`](Self::with_lock).
    pub fn pre_lock<L>(mut self, pre_lock: L) -> Self
    where
        L: Fn(&C) -> String + Send + Sync + 'static,
    {
        self.with_lock = true;
        self.pre_lock = Some(Arc::new(pre_lock));
        self
    }

    /// Finishes the handler with its invocation function.
    pub fn handle<F, Fut>(self, handler: F) -> CommandHandler
    where
        F: Fn(CommandMessage<C>, PathVariables) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        let options = HandlerOptions {
            with_lock: self.with_lock,
            has_pre_lock: self.pre_lock.is_some(),
        };
        CommandHandler {
            channel: self.channel,
            command_type: C::COMMAND_TYPE,
            resource: self.resource,
            options,
            invoker: Box::new(TypedInvoker {
                handler,
                with_lock: self.with_lock,
                pre_lock: self.pre_lock,
                _command: PhantomData,
            }),
        }
    }
}

fn match_resource(pattern: &str, resource: &str) -> Option<PathVariables> {
    let pattern: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let resource: Vec<&str> = resource.split('/').filter(|s| !s.is_empty()).collect();
    if pattern.len() != resource.len() {
        return None;
    }

    let mut variables = PathVariables::new();
    for (expected, actual) in pattern.iter().zip(resource) {
        match expected
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Some(name) => {
                variables.insert(name.to_string(), actual.to_string());
            }
            None if *expected == actual => {}
            None => return None,
        }
    }
    Some(variables)
}
