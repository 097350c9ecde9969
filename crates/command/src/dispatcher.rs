//! Command dispatcher: inbound commands in, correlated replies out.

use std::sync::Arc;

use message::{
    Headers, Message, MessageConsumer, MessageProducer, OutboundMessageProducer, handler_fn,
};
use tracing::Span;

use crate::correlation::correlate_message_headers;
use crate::error::{CommandError, Result};
use crate::handler::{CommandHandler, Invocation};
use crate::headers::CommandMessageHeaders;
use crate::outcome::{Failure, HandlerOutcome, ReplyValue};
use crate::registry::CommandHandlers;
use crate::reply::{ReplyLock, with_failure, with_success};

/// Consumes command messages, runs the matching handler and sends its replies.
///
/// Every inbound command with a known reply destination yields at least one
/// reply: the handler's results, one Failure per handler error, or a single
/// Failure when no handler matches or the payload cannot be decoded.
pub struct CommandDispatcher<P: MessageProducer, C: MessageConsumer> {
    dispatcher_id: String,
    handlers: CommandHandlers,
    consumer: C,
    producer: OutboundMessageProducer<P>,
    span: Span,
}

impl<P, C> CommandDispatcher<P, C>
where
    P: MessageProducer + 'static,
    C: MessageConsumer + 'static,
{
    /// Creates a dispatcher over a handler registry and a transport.
    pub fn new(
        dispatcher_id: impl Into<String>,
        handlers: CommandHandlers,
        consumer: C,
        producer: P,
    ) -> Self {
        Self {
            dispatcher_id: dispatcher_id.into(),
            handlers,
            consumer,
            producer: OutboundMessageProducer::new(producer),
            span: Span::none(),
        }
    }

    /// Attaches a span that parents every log event of this dispatcher.
    pub fn with_span(mut self, span: Span) -> Self {
        self.producer = self.producer.with_span(span.clone());
        self.span = span;
        self
    }

    pub fn dispatcher_id(&self) -> &str {
        &self.dispatcher_id
    }

    pub fn handlers(&self) -> &CommandHandlers {
        &self.handlers
    }

    /// Subscribes [`handle_message`](Self::handle_message) to every channel
    /// known to the registry, under this dispatcher's id.
    pub async fn subscribe(self: &Arc<Self>) -> Result<()> {
        let dispatcher = Arc::clone(self);
        let handler = handler_fn(move |message| {
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                if let Err(e) = dispatcher.handle_message(message).await {
                    tracing::error!(
                        parent: &dispatcher.span,
                        dispatcher_id = %dispatcher.dispatcher_id,
                        error = %e,
                        "command message not answered"
                    );
                }
            }
        });

        let channels = self.handlers.channels();
        tracing::info!(
            parent: &self.span,
            dispatcher_id = %self.dispatcher_id,
            ?channels,
            "subscribing command dispatcher"
        );
        self.consumer
            .subscribe(&self.dispatcher_id, &channels, handler)
            .await?;
        Ok(())
    }

    /// Handles one inbound command message.
    ///
    /// Returns an error only when no reply could be sent: the reply-to header
    /// is missing or the transport rejected the replies.
    #[tracing::instrument(
        parent = &self.span,
        skip_all,
        fields(
            dispatcher_id = %self.dispatcher_id,
            command_type = message.header(CommandMessageHeaders::COMMAND_TYPE).unwrap_or_default(),
        )
    )]
    pub async fn handle_message(&self, message: Message) -> Result<()> {
        let Some((handler, path_variables)) = self.handlers.find_target_method(&message) else {
            let error = CommandError::MissingCommandHandler {
                command_type: message
                    .header(CommandMessageHeaders::COMMAND_TYPE)
                    .unwrap_or_default()
                    .to_string(),
                channel: message
                    .header(Message::DESTINATION)
                    .unwrap_or_default()
                    .to_string(),
            };
            metrics::counter!("command_dispatch_total", "result" => "missing_handler")
                .increment(1);
            tracing::error!(error = %error, "no command handler");

            let reply_channel = message.required_header(CommandMessageHeaders::REPLY_TO)?;
            return self
                .handle_exception(
                    &message,
                    reply_channel,
                    Failure::from_error("MissingCommandHandler", &error),
                )
                .await;
        };

        let correlation_headers = correlate_message_headers(&message);
        let reply_channel = message
            .required_header(CommandMessageHeaders::REPLY_TO)?
            .to_string();

        let replies = match handler
            .invoke(&message, correlation_headers.clone(), path_variables)
            .await
        {
            Ok(invocation) => Self::replies_for(&handler, invocation),
            Err(e) => {
                metrics::counter!("command_dispatch_total", "result" => "decode_failed")
                    .increment(1);
                tracing::error!(error = %e, "failed to decode command");
                return self
                    .handle_exception(
                        &message,
                        &reply_channel,
                        Failure::from_error("CommandDecodeFailed", &e),
                    )
                    .await;
            }
        };

        metrics::counter!("command_dispatch_total", "result" => "handled").increment(1);
        if replies.is_empty() {
            tracing::debug!("handler produced no replies, not publishing");
            return Ok(());
        }

        tracing::debug!(
            replies = replies.len(),
            %reply_channel,
            "generated replies"
        );
        self.send_replies(&correlation_headers, replies, &reply_channel)
            .await
    }

    /// Converts a handler outcome into reply messages.
    fn replies_for(handler: &CommandHandler, invocation: Invocation) -> Vec<Message> {
        let lock = invocation.lock;
        debug_assert_eq!(lock.is_some(), handler.options().with_lock);

        match invocation.outcome {
            HandlerOutcome::Reply(value) => vec![Self::reply_for(value, lock.as_ref())],
            HandlerOutcome::Replies(values) => values
                .into_iter()
                .map(|value| Self::reply_for(value, lock.as_ref()))
                .collect(),
            HandlerOutcome::Failed(failures) => {
                tracing::error!(
                    failures = failures.len(),
                    errors = ?failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "command handler failed"
                );
                failures
                    .iter()
                    .map(|failure| match &lock {
                        Some(lock) => lock.with_failure(failure),
                        None => with_failure(failure),
                    })
                    .collect()
            }
        }
    }

    fn reply_for(value: ReplyValue, lock: Option<&ReplyLock>) -> Message {
        match value {
            ReplyValue::Message(message) => message,
            ReplyValue::Success(success) => match lock {
                Some(lock) => lock.with_success(success),
                None => with_success(success),
            },
        }
    }

    async fn handle_exception(
        &self,
        message: &Message,
        reply_channel: &str,
        failure: Failure,
    ) -> Result<()> {
        let correlation_headers = correlate_message_headers(message);
        self.send_replies(
            &correlation_headers,
            vec![with_failure(&failure)],
            reply_channel,
        )
        .await
    }

    async fn send_replies(
        &self,
        correlation_headers: &Headers,
        replies: Vec<Message>,
        reply_channel: &str,
    ) -> Result<()> {
        let replies: Vec<Message> = replies
            .into_iter()
            .map(|reply| reply.with_extra_headers(correlation_headers))
            .collect();
        let count = replies.len() as u64;

        self.producer
            .send_batch(reply_channel, replies, false)
            .await?;
        metrics::counter!("command_replies_total").increment(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::command::Command;
    use crate::headers::ReplyMessageHeaders;
    use crate::outcome::{CommandReplyOutcome, ReplyPayload, Success};
    use message::InMemoryTransport;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct ReserveCredit {
        customer_id: String,
        amount: u64,
    }

    impl Command for ReserveCredit {
        const COMMAND_TYPE: &'static str = "ReserveCredit";
    }

    #[derive(Debug, Serialize)]
    struct CreditReserved {
        remaining: u64,
    }

    impl ReplyPayload for CreditReserved {
        const REPLY_TYPE: &'static str = "CreditReserved";
    }

    fn command_message() -> Message {
        ReserveCredit {
            customer_id: "c-1".to_string(),
            amount: 40,
        }
        .to_message()
        .unwrap()
        .with_header(Message::ID, "cmd-1")
        .with_header(Message::DESTINATION, "customers")
        .with_header(CommandMessageHeaders::REPLY_TO, "order-replies")
        .with_header("command_saga_type", "CreateOrderSaga")
        .with_header("command_saga_id", "saga-1")
    }

    fn never_invoked(invoked: &Arc<AtomicBool>) -> CommandHandler {
        let invoked = Arc::clone(invoked);
        CommandHandler::new::<ReserveCredit, _, _>("customers", move |_, _| {
            invoked.store(true, Ordering::SeqCst);
            async { HandlerOutcome::none() }
        })
    }

    fn dispatcher(
        handler: CommandHandler,
        transport: &InMemoryTransport,
    ) -> CommandDispatcher<InMemoryTransport, InMemoryTransport> {
        CommandDispatcher::new(
            "customer-service",
            CommandHandlers::new().with(handler),
            transport.clone(),
            transport.clone(),
        )
    }

    #[tokio::test]
    async fn single_result_yields_one_success_reply() {
        let transport = InMemoryTransport::new();
        let dispatcher = dispatcher(
            CommandHandler::new::<ReserveCredit, _, _>("customers", |cm, _| async move {
                HandlerOutcome::success(&CreditReserved {
                    remaining: 100 - cm.command().amount,
                })
            }),
            &transport,
        );

        dispatcher.handle_message(command_message()).await.unwrap();

        let replies = transport.sent_to("order-replies");
        assert_eq!(replies.len(), 1);
        let reply = &replies[0];
        assert_eq!(
            CommandReplyOutcome::of(reply),
            Some(CommandReplyOutcome::Success)
        );
        assert_eq!(reply.header(ReplyMessageHeaders::REPLY_TYPE), Some("CreditReserved"));
        assert_eq!(reply.header("reply_saga_id"), Some("saga-1"));
        assert_eq!(reply.header("reply_saga_type"), Some("CreateOrderSaga"));
        assert_eq!(reply.header(ReplyMessageHeaders::IN_REPLY_TO), Some("cmd-1"));
        assert_eq!(reply.payload()["remaining"], 60);
        assert!(!reply.has_header(ReplyMessageHeaders::LOCKED_TARGET));
    }

    #[tokio::test]
    async fn aggregate_error_yields_one_failure_per_error() {
        let transport = InMemoryTransport::new();
        let dispatcher = dispatcher(
            CommandHandler::new::<ReserveCredit, _, _>("customers", |_, _| async {
                HandlerOutcome::Failed(vec![
                    Failure::new("LimitExceeded", "a"),
                    Failure::new("AccountFrozen", "b"),
                    Failure::new("FraudSuspected", "c"),
                ])
            }),
            &transport,
        );

        dispatcher.handle_message(command_message()).await.unwrap();

        let replies = transport.sent_to("order-replies");
        assert_eq!(replies.len(), 3);
        for reply in &replies {
            assert_eq!(
                CommandReplyOutcome::of(reply),
                Some(CommandReplyOutcome::Failure)
            );
            assert_eq!(reply.header("reply_saga_id"), Some("saga-1"));
        }
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test]
    async fn missing_handler_yields_single_failure() {
        let transport = InMemoryTransport::new();
        let invoked = Arc::new(AtomicBool::new(false));
        let dispatcher = dispatcher(
            never_invoked(&invoked),
            &transport,
        );

        let message = command_message().with_header(CommandMessageHeaders::COMMAND_TYPE, "Unknown");
        dispatcher.handle_message(message).await.unwrap();

        let replies = transport.sent_to("order-replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(
            CommandReplyOutcome::of(&replies[0]),
            Some(CommandReplyOutcome::Failure)
        );
        assert_eq!(replies[0].payload()["error_type"], "MissingCommandHandler");
        assert_eq!(replies[0].header("reply_saga_id"), Some("saga-1"));
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn undecodable_payload_yields_single_failure() {
        let transport = InMemoryTransport::new();
        let invoked = Arc::new(AtomicBool::new(false));
        let dispatcher = dispatcher(
            never_invoked(&invoked),
            &transport,
        );

        let message = Message::with_headers(
            serde_json::json!({"amount": "forty"}),
            command_message().headers().clone(),
        );
        dispatcher.handle_message(message).await.unwrap();

        let replies = transport.sent_to("order-replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].payload()["error_type"], "CommandDecodeFailed");
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn locked_handler_replies_carry_token() {
        let transport = InMemoryTransport::new();
        let dispatcher = dispatcher(
            CommandHandler::builder::<ReserveCredit>("customers")
                .with_lock()
                .handle(|_, _| async {
                    HandlerOutcome::Replies(vec![
                        ReplyValue::Success(Success {
                            reply_type: "CreditReserved".to_string(),
                            body: serde_json::Value::Null,
                        }),
                        ReplyValue::Message(Message::new(serde_json::json!("raw"))),
                    ])
                }),
            &transport,
        );

        dispatcher.handle_message(command_message()).await.unwrap();
        dispatcher.handle_message(command_message()).await.unwrap();

        let replies = transport.sent_to("order-replies");
        assert_eq!(replies.len(), 4);
        let expected = ReplyLock::for_command(&ReserveCredit {
            customer_id: "c-1".to_string(),
            amount: 40,
        })
        .unwrap();
        assert_eq!(
            replies[0].header(ReplyMessageHeaders::LOCKED_TARGET),
            Some(expected.token())
        );
        assert_eq!(
            replies[2].header(ReplyMessageHeaders::LOCKED_TARGET),
            Some(expected.token())
        );
        // passthrough messages are sent unchanged apart from correlation
        assert!(!replies[1].has_header(ReplyMessageHeaders::LOCKED_TARGET));
        assert_eq!(replies[1].header("reply_saga_id"), Some("saga-1"));
    }

    #[tokio::test]
    async fn empty_outcome_sends_nothing() {
        let transport = InMemoryTransport::new();
        let dispatcher = dispatcher(
            CommandHandler::new::<ReserveCredit, _, _>("customers", |_, _| async {
                HandlerOutcome::none()
            }),
            &transport,
        );

        dispatcher.handle_message(command_message()).await.unwrap();
        assert_eq!(transport.send_calls(), 0);
    }

    #[tokio::test]
    async fn missing_reply_to_is_an_error() {
        let transport = InMemoryTransport::new();
        let dispatcher = dispatcher(
            CommandHandler::new::<ReserveCredit, _, _>("customers", |_, _| async {
                HandlerOutcome::none()
            }),
            &transport,
        );

        let message = ReserveCredit {
            customer_id: "c-1".to_string(),
            amount: 1,
        }
        .to_message()
        .unwrap();
        let result = dispatcher.handle_message(message).await;

        assert!(matches!(
            result,
            Err(CommandError::Message(message::MessageError::MissingRequiredHeader(_)))
        ));
    }

    #[tokio::test]
    async fn inbound_message_is_not_mutated_by_reply_building() {
        let transport = InMemoryTransport::new();
        let dispatcher = dispatcher(
            CommandHandler::new::<ReserveCredit, _, _>("customers", |cm, _| async move {
                HandlerOutcome::message(cm.message().clone())
            }),
            &transport,
        );

        let inbound = command_message();
        dispatcher.handle_message(inbound.clone()).await.unwrap();

        let reply = &transport.sent_to("order-replies")[0];
        assert_ne!(reply.id(), inbound.id());
        assert_eq!(inbound.id(), Some("cmd-1"));
        assert_eq!(inbound.header(Message::DESTINATION), Some("customers"));
        assert_eq!(reply.header(Message::DESTINATION), Some("order-replies"));
    }
}
