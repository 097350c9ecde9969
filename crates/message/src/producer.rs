//! Outbound message preparation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::Span;

use crate::error::{MessageError, Result};
use crate::message::Message;

/// Transport-side producer.
///
/// Implementations own the broker connection and its delivery guarantees,
/// including any retry policy.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Returns a fresh message id, or `None` if the transport does not assign ids.
    fn generate_message_id(&self) -> Option<String>;

    /// Sends a single prepared message.
    async fn send(&self, destination: &str, message: Message, is_event: bool) -> Result<()>;

    /// Sends prepared messages as one batch.
    async fn send_batch(
        &self,
        destination: &str,
        messages: Vec<Message>,
        is_event: bool,
    ) -> Result<()>;
}

#[async_trait]
impl<T: MessageProducer + ?Sized> MessageProducer for Arc<T> {
    fn generate_message_id(&self) -> Option<String> {
        (**self).generate_message_id()
    }

    async fn send(&self, destination: &str, message: Message, is_event: bool) -> Result<()> {
        (**self).send(destination, message, is_event).await
    }

    async fn send_batch(
        &self,
        destination: &str,
        messages: Vec<Message>,
        is_event: bool,
    ) -> Result<()> {
        (**self).send_batch(destination, messages, is_event).await
    }
}

/// Stamps id, destination and date on outgoing messages before handing them
/// to the transport.
///
/// A message that ends up without an id is rejected with
/// [`MessageError::MissingRequiredId`] and the transport is never called.
#[derive(Clone)]
pub struct OutboundMessageProducer<P: MessageProducer> {
    target: P,
    span: Span,
}

impl<P: MessageProducer> OutboundMessageProducer<P> {
    /// Wraps a transport producer.
    pub fn new(target: P) -> Self {
        Self {
            target,
            span: Span::none(),
        }
    }

    /// Attaches a span that parents every log event of this producer.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the wrapped transport producer.
    pub fn target(&self) -> &P {
        &self.target
    }

    fn prepare(&self, destination: &str, mut message: Message) -> Result<Message> {
        match self.target.generate_message_id() {
            Some(id) => {
                message.set_header(Message::ID, id);
            }
            None if message.id().is_some() => {}
            None => {
                return Err(MessageError::MissingRequiredId {
                    message: message.to_string(),
                });
            }
        }

        message
            .set_header(Message::DESTINATION, destination)
            .set_header(
                Message::DATE,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        Ok(message)
    }

    /// Prepares and sends a single message, returning the id it was sent with.
    pub async fn send(
        &self,
        destination: &str,
        message: Message,
        is_event: bool,
    ) -> Result<String> {
        let message = self.prepare(destination, message)?;
        let id = message.id().unwrap_or_default().to_string();

        tracing::debug!(parent: &self.span, %destination, %message, "sending message");
        if let Err(e) = self.target.send(destination, message, is_event).await {
            metrics::counter!("message_send_failures_total").increment(1);
            tracing::error!(parent: &self.span, %destination, error = %e, "failed to send message");
            return Err(e);
        }

        metrics::counter!("messages_sent_total").increment(1);
        Ok(id)
    }

    /// Prepares every message, then sends them as one batch.
    ///
    /// Preparation is all-or-nothing: if any message lacks an id, nothing is sent.
    pub async fn send_batch(
        &self,
        destination: &str,
        messages: Vec<Message>,
        is_event: bool,
    ) -> Result<()> {
        let messages = messages
            .into_iter()
            .map(|message| self.prepare(destination, message))
            .collect::<Result<Vec<_>>>()?;
        let count = messages.len() as u64;

        tracing::debug!(
            parent: &self.span,
            %destination,
            count,
            ids = ?messages.iter().filter_map(Message::id).collect::<Vec<_>>(),
            "sending messages"
        );
        if let Err(e) = self.target.send_batch(destination, messages, is_event).await {
            metrics::counter!("message_send_failures_total").increment(count);
            tracing::error!(parent: &self.span, %destination, error = %e, "failed to send messages");
            return Err(e);
        }

        metrics::counter!("messages_sent_total").increment(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;

    fn payload() -> Message {
        Message::new(serde_json::json!({"amount": 10}))
    }

    #[tokio::test]
    async fn send_stamps_id_destination_and_date() {
        let transport = InMemoryTransport::new();
        let producer = OutboundMessageProducer::new(transport.clone());

        let id = producer.send("orders", payload(), false).await.unwrap();

        let sent = transport.sent_to("orders");
        assert_eq!(sent.len(), 1);
        let message = &sent[0];
        assert_eq!(message.id(), Some(id.as_str()));
        assert_eq!(message.header(Message::DESTINATION), Some("orders"));
        let date = message.header(Message::DATE).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(date).is_ok());
    }

    #[tokio::test]
    async fn transport_id_replaces_existing_id() {
        let transport = InMemoryTransport::new();
        let producer = OutboundMessageProducer::new(transport.clone());

        let message = payload().with_header(Message::ID, "caller-chosen");
        producer.send("orders", message, false).await.unwrap();

        let sent = transport.sent_to("orders");
        assert_ne!(sent[0].id(), Some("caller-chosen"));
    }

    #[tokio::test]
    async fn existing_id_kept_when_transport_has_none() {
        let transport = InMemoryTransport::without_ids();
        let producer = OutboundMessageProducer::new(transport.clone());

        let message = payload().with_header(Message::ID, "caller-chosen");
        let id = producer.send("orders", message, false).await.unwrap();

        assert_eq!(id, "caller-chosen");
        assert_eq!(transport.sent_to("orders")[0].id(), Some("caller-chosen"));
    }

    #[tokio::test]
    async fn missing_id_fails_without_transport_call() {
        let transport = InMemoryTransport::without_ids();
        let producer = OutboundMessageProducer::new(transport.clone());

        let result = producer.send("orders", payload(), false).await;

        assert!(matches!(result, Err(MessageError::MissingRequiredId { .. })));
        assert_eq!(transport.send_calls(), 0);
    }

    #[tokio::test]
    async fn batch_with_one_missing_id_sends_nothing() {
        let transport = InMemoryTransport::without_ids();
        let producer = OutboundMessageProducer::new(transport.clone());

        let messages = vec![payload().with_header(Message::ID, "m-1"), payload()];
        let result = producer.send_batch("orders", messages, false).await;

        assert!(matches!(result, Err(MessageError::MissingRequiredId { .. })));
        assert_eq!(transport.send_calls(), 0);
        assert!(transport.sent_to("orders").is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_returned() {
        let transport = InMemoryTransport::new();
        transport.set_fail_on_send(true);
        let producer = OutboundMessageProducer::new(transport.clone());

        let result = producer.send_batch("orders", vec![payload()], false).await;

        assert!(matches!(result, Err(MessageError::Transport(_))));
        assert_eq!(transport.send_calls(), 1);
    }
}
