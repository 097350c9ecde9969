//! Saga headers carried on commands and echoed on replies.

use command::ReplyMessageHeaders;

/// Headers a saga adds to every command it sends.
pub struct SagaCommandHeaders;

impl SagaCommandHeaders {
    pub const SAGA_TYPE: &'static str = "command_saga_type";
    pub const SAGA_ID: &'static str = "command_saga_id";
}

/// Headers a saga reads from replies.
///
/// The dispatcher echoes every `command_` header under the `reply_` prefix,
/// so the saga headers come back without participants knowing about them.
pub struct SagaReplyHeaders;

impl SagaReplyHeaders {
    pub const REPLY_SAGA_TYPE: &'static str = "reply_saga_type";
    pub const REPLY_SAGA_ID: &'static str = "reply_saga_id";
    pub const REPLY_LOCKED: &'static str = ReplyMessageHeaders::LOCKED_TARGET;
}
