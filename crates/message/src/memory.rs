//! In-memory transport for tests and single-process wiring.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use uuid::Uuid;

use crate::consumer::{MessageConsumer, MessageHandler};
use crate::error::{MessageError, Result};
use crate::message::Message;
use crate::producer::MessageProducer;

/// A message recorded by [`InMemoryTransport`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub destination: String,
    pub message: Message,
    pub is_event: bool,
}

struct Subscription {
    subscriber_id: String,
    channels: Vec<String>,
    handler: MessageHandler,
}

struct TransportState {
    sent: Vec<SentMessage>,
    subscriptions: Vec<Subscription>,
    send_calls: usize,
    generate_ids: bool,
    fail_on_send: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            subscriptions: Vec::new(),
            send_calls: 0,
            generate_ids: true,
            fail_on_send: false,
        }
    }
}

/// In-memory transport for testing.
///
/// Acts as both producer and consumer: sent messages are recorded per
/// destination, and [`deliver`](Self::deliver) pushes a message to every
/// subscriber of a channel. Nothing is delivered automatically, so tests
/// control exactly when replies flow back.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<RwLock<TransportState>>,
}

impl InMemoryTransport {
    /// Creates a transport that assigns a UUID to every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that never generates message ids.
    pub fn without_ids() -> Self {
        let transport = Self::default();
        transport.state.write().unwrap().generate_ids = false;
        transport
    }

    /// Configures the transport to reject every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of `send`/`send_batch` calls that reached the transport.
    pub fn send_calls(&self) -> usize {
        self.state.read().unwrap().send_calls
    }

    /// Returns every message sent so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the messages sent to one destination.
    pub fn sent_to(&self, destination: &str) -> Vec<Message> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|s| s.destination == destination)
            .map(|s| s.message.clone())
            .collect()
    }

    /// Removes and returns the messages sent to one destination.
    pub fn take_sent_to(&self, destination: &str) -> Vec<Message> {
        let mut state = self.state.write().unwrap();
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.sent)
            .into_iter()
            .partition(|s| s.destination == destination);
        state.sent = kept;
        taken.into_iter().map(|s| s.message).collect()
    }

    /// Returns the ids of subscribers listening on a channel.
    pub fn subscribers(&self, channel: &str) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.channels.iter().any(|c| c == channel))
            .map(|s| s.subscriber_id.clone())
            .collect()
    }

    /// Delivers a message to every subscriber of `channel`.
    ///
    /// Returns the number of subscribers that handled it.
    pub async fn deliver(&self, channel: &str, message: Message) -> usize {
        let handlers: Vec<MessageHandler> = self
            .state
            .read()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.channels.iter().any(|c| c == channel))
            .map(|s| s.handler.clone())
            .collect();

        for handler in &handlers {
            handler(message.clone()).await;
        }
        handlers.len()
    }

    /// Delivers several messages concurrently, without ordering between them.
    pub async fn deliver_all(&self, channel: &str, messages: Vec<Message>) -> usize {
        join_all(messages.into_iter().map(|m| self.deliver(channel, m)))
            .await
            .into_iter()
            .sum()
    }

    fn record(&self, destination: &str, messages: Vec<Message>, is_event: bool) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.send_calls += 1;

        if state.fail_on_send {
            return Err(MessageError::Transport(format!(
                "destination {destination} unavailable"
            )));
        }

        state
            .sent
            .extend(messages.into_iter().map(|message| SentMessage {
                destination: destination.to_string(),
                message,
                is_event,
            }));
        Ok(())
    }
}

#[async_trait]
impl MessageProducer for InMemoryTransport {
    fn generate_message_id(&self) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .generate_ids
            .then(|| Uuid::new_v4().to_string())
    }

    async fn send(&self, destination: &str, message: Message, is_event: bool) -> Result<()> {
        self.record(destination, vec![message], is_event)
    }

    async fn send_batch(
        &self,
        destination: &str,
        messages: Vec<Message>,
        is_event: bool,
    ) -> Result<()> {
        self.record(destination, messages, is_event)
    }
}

#[async_trait]
impl MessageConsumer for InMemoryTransport {
    async fn subscribe(
        &self,
        subscriber_id: &str,
        channels: &[String],
        handler: MessageHandler,
    ) -> Result<()> {
        self.state.write().unwrap().subscriptions.push(Subscription {
            subscriber_id: subscriber_id.to_string(),
            channels: channels.to_vec(),
            handler,
        });
        Ok(())
    }
}
