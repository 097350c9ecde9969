//! Saga steps and the outcomes they produce.

use async_trait::async_trait;
use command::{Command, CommandMessageHeaders};
use message::Message;

use crate::error::{Result, SagaError};

/// A command message addressed to a participant channel.
#[derive(Debug, Clone)]
pub struct CommandWithDestination {
    destination: String,
    message: Message,
}

impl CommandWithDestination {
    /// Serializes `command` for delivery on `destination`.
    pub fn new<C: Command>(destination: impl Into<String>, command: &C) -> Result<Self> {
        Ok(Self {
            destination: destination.into(),
            message: command.to_message()?,
        })
    }

    /// Targets a specific resource, e.g. `/customers/42`.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.message.set_header(CommandMessageHeaders::RESOURCE, resource);
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_parts(self) -> (String, Message) {
        (self.destination, self.message)
    }
}

/// What executing one step produced.
#[derive(Debug)]
pub enum StepOutcome<D> {
    /// The step ran in-process and produced new saga data.
    Local(D),
    /// The step wants these commands sent; the saga waits for their replies.
    Remote(Vec<CommandWithDestination>),
}

/// One step of a saga definition.
///
/// A step may define a forward action, a compensation, or both. Steps without
/// an action are skipped going forward; steps without a compensation are
/// skipped while compensating.
#[async_trait]
pub trait SagaStep<D>: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn has_action(&self) -> bool;

    fn has_compensation(&self) -> bool;

    /// Runs the forward action, or the compensation when `compensating`.
    async fn create_step_outcome(&self, data: &D, compensating: bool) -> Result<StepOutcome<D>>;

    /// Applies a successful forward reply to the saga data.
    fn handle_reply(&self, _data: &mut D, _reply: &Message) -> Result<()> {
        Ok(())
    }
}

type LocalFn<D> = Box<dyn Fn(&mut D) -> Result<()> + Send + Sync>;

/// A step that mutates the saga data in-process.
pub struct LocalStep<D> {
    name: String,
    action: Option<LocalFn<D>>,
    compensation: Option<LocalFn<D>>,
}

impl<D> LocalStep<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: None,
            compensation: None,
        }
    }

    /// Sets the forward action. Returning an error starts compensation.
    pub fn action<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut D) -> Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Box::new(f));
        self
    }

    pub fn compensation<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut D) -> Result<()> + Send + Sync + 'static,
    {
        self.compensation = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl<D> SagaStep<D> for LocalStep<D>
where
    D: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn has_action(&self) -> bool {
        self.action.is_some()
    }

    fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    async fn create_step_outcome(&self, data: &D, compensating: bool) -> Result<StepOutcome<D>> {
        let f = select(&self.name, &self.action, &self.compensation, compensating)?;
        let mut updated = data.clone();
        f(&mut updated)?;
        Ok(StepOutcome::Local(updated))
    }
}

type CommandsFn<D> = Box<dyn Fn(&D) -> Result<Vec<CommandWithDestination>> + Send + Sync>;
type ReplyFn<D> = Box<dyn Fn(&mut D, &Message) -> Result<()> + Send + Sync>;

/// A step that sends commands to participants and waits for their replies.
pub struct RemoteStep<D> {
    name: String,
    action: Option<CommandsFn<D>>,
    compensation: Option<CommandsFn<D>>,
    on_reply: Option<ReplyFn<D>>,
}

impl<D> RemoteStep<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: None,
            compensation: None,
            on_reply: None,
        }
    }

    /// Sends one command going forward.
    pub fn invoke_participant<F>(self, f: F) -> Self
    where
        F: Fn(&D) -> Result<CommandWithDestination> + Send + Sync + 'static,
    {
        self.invoke_participants(move |data| Ok(vec![f(data)?]))
    }

    /// Sends several commands going forward; the step completes when every
    /// one of them has been answered.
    pub fn invoke_participants<F>(mut self, f: F) -> Self
    where
        F: Fn(&D) -> Result<Vec<CommandWithDestination>> + Send + Sync + 'static,
    {
        self.action = Some(Box::new(f));
        self
    }

    pub fn with_compensation<F>(mut self, f: F) -> Self
    where
        F: Fn(&D) -> Result<CommandWithDestination> + Send + Sync + 'static,
    {
        self.compensation = Some(Box::new(move |data| Ok(vec![f(data)?])));
        self
    }

    /// Applies each successful forward reply to the saga data.
    pub fn on_reply<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut D, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on_reply = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl<D> SagaStep<D> for RemoteStep<D>
where
    D: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn has_action(&self) -> bool {
        self.action.is_some()
    }

    fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    async fn create_step_outcome(&self, data: &D, compensating: bool) -> Result<StepOutcome<D>> {
        let f = select(&self.name, &self.action, &self.compensation, compensating)?;
        Ok(StepOutcome::Remote(f(data)?))
    }

    fn handle_reply(&self, data: &mut D, reply: &Message) -> Result<()> {
        match &self.on_reply {
            Some(f) => f(data, reply),
            None => Ok(()),
        }
    }
}

fn select<'a, T>(
    name: &str,
    action: &'a Option<T>,
    compensation: &'a Option<T>,
    compensating: bool,
) -> Result<&'a T> {
    let (f, direction) = if compensating {
        (compensation, "compensating")
    } else {
        (action, "forward")
    };
    f.as_ref().ok_or_else(|| SagaError::StepNotApplicable {
        step: name.to_string(),
        direction,
    })
}
