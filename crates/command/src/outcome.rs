//! Handler outcomes and the Success/Failure reply wrappers.

use message::Message;
use serde::{Deserialize, Serialize};

/// A typed reply payload.
pub trait ReplyPayload: Serialize {
    /// Type name written to the `reply_payload_type` header.
    const REPLY_TYPE: &'static str;
}

/// Semantic result carried by a reply, independent of its correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandReplyOutcome {
    Success,
    Failure,
}

impl CommandReplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandReplyOutcome::Success => "SUCCESS",
            CommandReplyOutcome::Failure => "FAILURE",
        }
    }

    /// Reads the outcome header of a reply message.
    pub fn of(message: &Message) -> Option<Self> {
        match message.header(crate::ReplyMessageHeaders::REPLY_OUTCOME)? {
            "SUCCESS" => Some(CommandReplyOutcome::Success),
            "FAILURE" => Some(CommandReplyOutcome::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandReplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A positive reply payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    pub reply_type: String,
    pub body: serde_json::Value,
}

impl Success {
    pub fn new<R: ReplyPayload>(reply: &R) -> Result<Self, serde_json::Error> {
        Ok(Self {
            reply_type: R::REPLY_TYPE.to_string(),
            body: serde_json::to_value(reply)?,
        })
    }
}

/// A negative reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub error_type: String,
    pub message: String,
}

impl Failure {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Wraps any error under the given type name.
    pub fn from_error(error_type: impl Into<String>, error: &dyn std::error::Error) -> Self {
        Self::new(error_type, error.to_string())
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// One value returned by a handler.
#[derive(Debug, Clone)]
pub enum ReplyValue {
    /// A fully built reply, sent as is (correlation headers are still added).
    Message(Message),
    /// A plain value, wrapped as a Success reply.
    Success(Success),
}

/// What a command handler produced.
///
/// One inbound command can legitimately produce many replies: one per value
/// in `Replies`, one per error in `Failed`.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Reply(ReplyValue),
    Replies(Vec<ReplyValue>),
    /// One or more independent failures; each becomes its own Failure reply.
    Failed(Vec<Failure>),
}

impl HandlerOutcome {
    /// A single Success reply. A payload that cannot be serialized turns into
    /// a Failure instead.
    pub fn success<R: ReplyPayload>(reply: &R) -> Self {
        match Success::new(reply) {
            Ok(success) => HandlerOutcome::Reply(ReplyValue::Success(success)),
            Err(e) => HandlerOutcome::failure(Failure::from_error("ReplySerializationFailed", &e)),
        }
    }

    /// A reply message passed through unchanged.
    pub fn message(message: Message) -> Self {
        HandlerOutcome::Reply(ReplyValue::Message(message))
    }

    pub fn failure(failure: Failure) -> Self {
        HandlerOutcome::Failed(vec![failure])
    }

    /// No replies at all.
    pub fn none() -> Self {
        HandlerOutcome::Replies(Vec::new())
    }
}

impl<R: ReplyPayload> From<Result<R, Failure>> for HandlerOutcome {
    fn from(result: Result<R, Failure>) -> Self {
        match result {
            Ok(reply) => HandlerOutcome::success(&reply),
            Err(failure) => HandlerOutcome::failure(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct CreditReserved {
        amount: u64,
    }

    impl ReplyPayload for CreditReserved {
        const REPLY_TYPE: &'static str = "CreditReserved";
    }

    #[test]
    fn success_carries_reply_type() {
        match HandlerOutcome::success(&CreditReserved { amount: 5 }) {
            HandlerOutcome::Reply(ReplyValue::Success(success)) => {
                assert_eq!(success.reply_type, "CreditReserved");
                assert_eq!(success.body["amount"], 5);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn err_result_becomes_single_failure() {
        let result: Result<CreditReserved, Failure> =
            Err(Failure::new("CreditLimitExceeded", "limit is 100"));
        match HandlerOutcome::from(result) {
            HandlerOutcome::Failed(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].to_string(), "CreditLimitExceeded: limit is 100");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn outcome_header_round_trips() {
        let message = Message::new(serde_json::Value::Null).with_header(
            crate::ReplyMessageHeaders::REPLY_OUTCOME,
            CommandReplyOutcome::Failure.as_str(),
        );
        assert_eq!(
            CommandReplyOutcome::of(&message),
            Some(CommandReplyOutcome::Failure)
        );
    }
}
