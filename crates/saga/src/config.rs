//! Saga manager configuration.

use std::env;

/// Saga manager configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Channel participants send replies to.
    pub reply_channel: String,
    /// Subscriber id used when consuming replies.
    pub subscriber_id: String,
}

impl SagaConfig {
    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SAGA_REPLY_CHANNEL`: reply channel (default: "saga-replies")
    /// - `SAGA_SUBSCRIBER_ID`: reply subscriber id (default: "saga-manager")
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reply_channel: env::var("SAGA_REPLY_CHANNEL").unwrap_or(defaults.reply_channel),
            subscriber_id: env::var("SAGA_SUBSCRIBER_ID").unwrap_or(defaults.subscriber_id),
        }
    }

    /// Uses a dedicated reply channel, builder style.
    pub fn with_reply_channel(mut self, channel: impl Into<String>) -> Self {
        self.reply_channel = channel.into();
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            reply_channel: "saga-replies".to_string(),
            subscriber_id: "saga-manager".to_string(),
        }
    }
}
