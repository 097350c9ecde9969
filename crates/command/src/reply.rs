//! Building Success/Failure reply messages.

use message::Message;
use uuid::Uuid;

use crate::command::Command;
use crate::headers::ReplyMessageHeaders;
use crate::outcome::{CommandReplyOutcome, Failure, Success};

/// Builds a positive reply.
pub fn with_success(success: Success) -> Message {
    Message::new(success.body)
        .with_header(
            ReplyMessageHeaders::REPLY_OUTCOME,
            CommandReplyOutcome::Success.as_str(),
        )
        .with_header(ReplyMessageHeaders::REPLY_TYPE, success.reply_type)
}

/// Builds a negative reply.
pub fn with_failure(failure: &Failure) -> Message {
    let body = serde_json::json!({
        "error_type": failure.error_type,
        "message": failure.message,
    });
    Message::new(body)
        .with_header(
            ReplyMessageHeaders::REPLY_OUTCOME,
            CommandReplyOutcome::Failure.as_str(),
        )
        .with_header(ReplyMessageHeaders::REPLY_TYPE, "Failure")
}

/// Builds replies under the lock token of a typed command.
pub fn with_lock<C: Command>(command: &C) -> Result<ReplyLock, serde_json::Error> {
    ReplyLock::for_command(command)
}

/// Idempotency token attached to the replies of a locking handler.
///
/// The token is a pure function of the command, so every redelivery of the
/// same command yields replies with the same token and the saga side can
/// drop the duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyLock {
    token: String,
}

impl ReplyLock {
    /// Derives the token from a command type and its JSON payload.
    pub fn for_payload(command_type: &str, payload: &serde_json::Value) -> Self {
        let name = format!("{command_type}:{payload}");
        Self {
            token: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
        }
    }

    /// Derives the token from a typed command.
    pub fn for_command<C: Command>(command: &C) -> Result<Self, serde_json::Error> {
        Ok(Self::for_payload(
            C::COMMAND_TYPE,
            &serde_json::to_value(command)?,
        ))
    }

    /// Uses an explicit lock target, as computed by a handler's pre-lock.
    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            token: target.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn with_success(&self, success: Success) -> Message {
        with_success(success).with_header(ReplyMessageHeaders::LOCKED_TARGET, self.token.as_str())
    }

    pub fn with_failure(&self, failure: &Failure) -> Message {
        with_failure(failure).with_header(ReplyMessageHeaders::LOCKED_TARGET, self.token.as_str())
    }
}
