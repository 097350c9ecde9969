//! In-memory saga manager: runs steps, sends commands and consumes replies.

use std::collections::HashMap;
use std::sync::Arc;

use command::{CommandMessageHeaders, CommandReplyOutcome, ReplyMessageHeaders};
use common::SagaId;
use message::{Message, MessageConsumer, MessageProducer, OutboundMessageProducer, handler_fn};
use tokio::sync::{Mutex, RwLock};
use tracing::Span;

use crate::config::SagaConfig;
use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::headers::{SagaCommandHeaders, SagaReplyHeaders};
use crate::instance::{PendingStep, SagaInstance};
use crate::state::SagaState;
use crate::step::CommandWithDestination;

type SharedInstance<D> = Arc<Mutex<SagaInstance<D>>>;

/// Orchestrates instances of one saga definition.
///
/// Each instance advances under its own lock, so replies for different sagas
/// are processed concurrently while replies for the same saga are serialized.
pub struct SagaManager<D, P: MessageProducer> {
    definition: SagaDefinition<D>,
    producer: OutboundMessageProducer<P>,
    config: SagaConfig,
    instances: RwLock<HashMap<SagaId, SharedInstance<D>>>,
    span: Span,
}

impl<D, P> SagaManager<D, P>
where
    D: Clone + Send + Sync + 'static,
    P: MessageProducer + 'static,
{
    pub fn new(definition: SagaDefinition<D>, producer: P, config: SagaConfig) -> Self {
        Self {
            definition,
            producer: OutboundMessageProducer::new(producer),
            config,
            instances: RwLock::new(HashMap::new()),
            span: Span::none(),
        }
    }

    /// Attaches a span that parents every log event of this manager.
    pub fn with_span(mut self, span: Span) -> Self {
        self.producer = self.producer.with_span(span.clone());
        self.span = span;
        self
    }

    pub fn definition(&self) -> &SagaDefinition<D> {
        &self.definition
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Returns a snapshot of an instance.
    pub async fn find(&self, saga_id: SagaId) -> Option<SagaInstance<D>> {
        let instance = self.instances.read().await.get(&saga_id).cloned()?;
        let snapshot = instance.lock().await.clone();
        Some(snapshot)
    }

    /// Starts a new saga and runs it until it waits for replies or ends.
    #[tracing::instrument(
        parent = &self.span,
        skip_all,
        fields(saga_type = %self.definition.saga_type())
    )]
    pub async fn create(&self, data: D) -> Result<SagaId> {
        let instance = SagaInstance::new(
            self.definition.saga_type(),
            data,
            self.definition.initial_state(),
        );
        let saga_id = instance.id();
        let shared = Arc::new(Mutex::new(instance));

        // Hold the instance lock before publishing it so early replies wait.
        let mut instance = shared.lock().await;
        self.instances
            .write()
            .await
            .insert(saga_id, Arc::clone(&shared));

        metrics::counter!("saga_started_total", "saga_type" => self.definition.saga_type().to_string())
            .increment(1);
        tracing::info!(%saga_id, "saga started");

        self.advance(&mut instance).await?;
        Ok(saga_id)
    }

    /// Applies one reply to its saga and advances it.
    ///
    /// A reply counts only when its `reply_to_message_id` names a command of
    /// the step waiting for replies. Replies for other saga types, finished
    /// sagas, already answered commands and abandoned commands are discarded
    /// without error.
    #[tracing::instrument(
        parent = &self.span,
        skip_all,
        fields(
            saga_type = %self.definition.saga_type(),
            saga_id = reply.header(SagaReplyHeaders::REPLY_SAGA_ID).unwrap_or_default(),
        )
    )]
    pub async fn handle_reply(&self, reply: &Message) -> Result<()> {
        if let Some(saga_type) = reply.header(SagaReplyHeaders::REPLY_SAGA_TYPE) {
            if saga_type != self.definition.saga_type() {
                tracing::debug!(%saga_type, "reply for another saga type ignored");
                return Ok(());
            }
        }

        let raw_id = reply.required_header(SagaReplyHeaders::REPLY_SAGA_ID)?;
        let saga_id: SagaId = raw_id
            .parse()
            .map_err(|_| SagaError::InvalidReply(format!("malformed saga id '{raw_id}'")))?;
        let outcome = CommandReplyOutcome::of(reply).ok_or_else(|| {
            SagaError::InvalidReply(format!(
                "missing or unknown {}",
                ReplyMessageHeaders::REPLY_OUTCOME
            ))
        })?;

        let in_reply_to = reply.required_header(ReplyMessageHeaders::IN_REPLY_TO)?;

        let shared = self
            .instances
            .read()
            .await
            .get(&saga_id)
            .cloned()
            .ok_or(SagaError::SagaNotFound(saga_id))?;
        let mut guard = shared.lock().await;
        let instance = &mut *guard;

        if !instance.state.is_active() {
            return self.discard(reply, "saga already finished");
        }
        if instance.answered.contains(in_reply_to) {
            return self.discard(reply, "command already answered");
        }
        let Some(pending) = instance.pending.as_mut() else {
            return self.discard(reply, "no step is waiting for replies");
        };
        // Commands abandoned by a failed send or a direction switch are not awaited.
        if !pending.resolve(in_reply_to) {
            return self.discard(reply, "command does not belong to the pending step");
        }
        instance.answered.insert(in_reply_to.to_string());

        let step_index = pending.step_index;
        match outcome {
            CommandReplyOutcome::Success if !instance.execution.is_compensating() => {
                if let Some(step) = self.definition.step_at(step_index) {
                    if let Err(e) = step.handle_reply(&mut instance.data, reply) {
                        pending.failure.get_or_insert_with(|| e.to_string());
                    }
                }
            }
            CommandReplyOutcome::Success => {}
            CommandReplyOutcome::Failure => {
                pending
                    .failure
                    .get_or_insert_with(|| failure_reason(reply));
            }
        }

        if !pending.is_resolved() {
            tracing::debug!(
                step_index,
                remaining = pending.awaiting.len(),
                locked = reply.header(SagaReplyHeaders::REPLY_LOCKED).unwrap_or_default(),
                "waiting for more replies"
            );
            return Ok(());
        }

        let failure = instance.pending.take().and_then(|p| p.failure);
        if let Some(reason) = failure {
            if instance.execution.is_compensating() {
                let error = SagaError::CompensationFailed {
                    step: self.step_name(step_index),
                    reason,
                };
                return Err(self.fail(instance, error));
            }
            tracing::warn!(step_index, %reason, "saga step failed, compensating");
            instance.start_compensating(reason);
        }

        self.advance(instance).await
    }

    /// Runs steps until one waits for replies or the saga ends.
    async fn advance(&self, instance: &mut SagaInstance<D>) -> Result<()> {
        loop {
            let next = self.definition.next_step_to_execute(&instance.execution);
            let actions = match next
                .execute_step(instance.data.clone(), instance.execution)
                .await
            {
                Ok(actions) => actions,
                Err(e) => return Err(self.fail(instance, e)),
            };

            instance.data = actions.updated_data;
            instance.execution = actions.updated_state;

            if let Some(reason) = actions.local_failure {
                tracing::warn!(
                    step_index = ?actions.step_index,
                    %reason,
                    "local saga step failed, compensating"
                );
                instance.start_compensating(reason);
                continue;
            }

            if !actions.commands.is_empty() {
                let step_index = actions.step_index.unwrap_or_default();
                let mut pending = PendingStep::new(step_index);
                let sent = self
                    .send_commands(instance, actions.commands, &mut pending)
                    .await;
                if let Err(e) = sent {
                    if instance.execution.is_compensating() {
                        let error = SagaError::CompensationFailed {
                            step: self.step_name(step_index),
                            reason: e.to_string(),
                        };
                        return Err(self.fail(instance, error));
                    }
                    tracing::warn!(
                        step_index,
                        abandoned = pending.awaiting.len(),
                        error = %e,
                        "saga commands not sent, compensating"
                    );
                    instance.start_compensating(e.to_string());
                    continue;
                }
                instance.pending = Some(pending);
                return Ok(());
            }

            if actions.is_end_state {
                self.finish(instance);
                return Ok(());
            }
        }
    }

    /// Sends the step's commands one by one, recording each id in `pending`.
    async fn send_commands(
        &self,
        instance: &SagaInstance<D>,
        commands: Vec<CommandWithDestination>,
        pending: &mut PendingStep,
    ) -> Result<()> {
        let saga_id = instance.id.to_string();
        for command in commands {
            let (destination, mut message) = command.into_parts();
            message
                .set_header(SagaCommandHeaders::SAGA_TYPE, instance.saga_type.as_str())
                .set_header(SagaCommandHeaders::SAGA_ID, saga_id.as_str())
                .set_header(CommandMessageHeaders::REPLY_TO, self.config.reply_channel.as_str());
            if !message.has_header(Message::CORRELATION_ID) {
                message.set_header(Message::CORRELATION_ID, saga_id.as_str());
            }

            tracing::debug!(
                %destination,
                command_type = message.header(CommandMessageHeaders::COMMAND_TYPE).unwrap_or_default(),
                compensating = instance.execution.is_compensating(),
                "sending saga command"
            );
            let id = self.producer.send(&destination, message, false).await?;
            pending.awaiting.insert(id);
        }
        Ok(())
    }

    fn finish(&self, instance: &mut SagaInstance<D>) {
        let saga_type = self.definition.saga_type().to_string();
        let state = SagaState::finished(instance.execution.is_compensating());
        instance.transition(state);
        match state {
            SagaState::Compensated => {
                metrics::counter!("saga_compensated_total", "saga_type" => saga_type).increment(1)
            }
            _ => metrics::counter!("saga_completed_total", "saga_type" => saga_type).increment(1),
        }

        let elapsed = instance.updated_at - instance.started_at;
        metrics::histogram!("saga_duration_seconds")
            .record(elapsed.num_milliseconds() as f64 / 1000.0);
        tracing::info!(saga_id = %instance.id, state = %instance.state, "saga finished");
    }

    fn fail(&self, instance: &mut SagaInstance<D>, error: SagaError) -> SagaError {
        instance.failure_reason = Some(error.to_string());
        instance.transition(SagaState::Failed);
        metrics::counter!("saga_failed_total", "saga_type" => self.definition.saga_type().to_string())
            .increment(1);
        tracing::error!(saga_id = %instance.id, error = %error, "saga failed during compensation");
        error
    }

    fn discard(&self, reply: &Message, reason: &'static str) -> Result<()> {
        metrics::counter!("saga_duplicate_replies_total").increment(1);
        tracing::debug!(
            reply_id = reply.id().unwrap_or_default(),
            in_reply_to = reply.header(ReplyMessageHeaders::IN_REPLY_TO).unwrap_or_default(),
            locked = reply.header(SagaReplyHeaders::REPLY_LOCKED).unwrap_or_default(),
            reason,
            "saga reply discarded"
        );
        Ok(())
    }

    fn step_name(&self, index: usize) -> String {
        self.definition
            .step_at(index)
            .map_or_else(|| index.to_string(), |step| step.name().to_string())
    }

    /// Subscribes [`handle_reply`](Self::handle_reply) to the reply channel.
    pub async fn subscribe<C: MessageConsumer>(self: &Arc<Self>, consumer: &C) -> Result<()> {
        let manager = Arc::clone(self);
        let handler = handler_fn(move |reply| {
            let manager = Arc::clone(&manager);
            async move {
                if let Err(e) = manager.handle_reply(&reply).await {
                    tracing::error!(parent: &manager.span, error = %e, "saga reply not applied");
                }
            }
        });

        let channels = [self.config.reply_channel.clone()];
        tracing::info!(
            parent: &self.span,
            subscriber_id = %self.config.subscriber_id,
            ?channels,
            "subscribing saga manager"
        );
        consumer
            .subscribe(&self.config.subscriber_id, &channels, handler)
            .await?;
        Ok(())
    }
}

/// Human-readable reason carried by a Failure reply.
fn failure_reason(reply: &Message) -> String {
    let payload = reply.payload();
    match (payload["error_type"].as_str(), payload["message"].as_str()) {
        (Some(error_type), Some(message)) => format!("{error_type}: {message}"),
        (Some(error_type), None) => error_type.to_string(),
        _ => "failure reply".to_string(),
    }
}
