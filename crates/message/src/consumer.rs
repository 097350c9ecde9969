//! Transport-side consumer seam.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::message::Message;

/// Callback invoked by the transport for every delivered message.
///
/// The callback owns its error reporting; the transport only awaits it.
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)))
}

/// Transport-side consumer.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Registers `handler` for every message delivered on `channels`.
    async fn subscribe(
        &self,
        subscriber_id: &str,
        channels: &[String],
        handler: MessageHandler,
    ) -> Result<()>;
}

#[async_trait]
impl<T: MessageConsumer + ?Sized> MessageConsumer for Arc<T> {
    async fn subscribe(
        &self,
        subscriber_id: &str,
        channels: &[String],
        handler: MessageHandler,
    ) -> Result<()> {
        (**self).subscribe(subscriber_id, channels, handler).await
    }
}
