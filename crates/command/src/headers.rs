//! Header names used on command and reply messages.

/// Headers set on command messages.
pub struct CommandMessageHeaders;

impl CommandMessageHeaders {
    /// Every request header with this prefix is echoed on the reply.
    pub const COMMAND_HEADER_PREFIX: &'static str = "command_";
    /// Prefix that replaces [`Self::COMMAND_HEADER_PREFIX`] on the reply.
    pub const COMMAND_REPLY_PREFIX: &'static str = "reply_";

    /// Discriminator matched against [`crate::Command::COMMAND_TYPE`].
    pub const COMMAND_TYPE: &'static str = "command_type";
    /// Resource path matched against a handler's resource pattern.
    pub const RESOURCE: &'static str = "command_resource";
    /// Destination for the replies to this command.
    pub const REPLY_TO: &'static str = "command_reply_to";

    /// Returns the reply-side name of a request header.
    ///
    /// `command_saga_id` becomes `reply_saga_id`; a header without the command
    /// prefix is simply prefixed with `reply_`.
    pub fn in_reply(header: &str) -> String {
        let name = header
            .strip_prefix(Self::COMMAND_HEADER_PREFIX)
            .unwrap_or(header);
        format!("{}{}", Self::COMMAND_REPLY_PREFIX, name)
    }
}

/// Headers set on reply messages.
pub struct ReplyMessageHeaders;

impl ReplyMessageHeaders {
    /// Id of the command message this reply answers.
    pub const IN_REPLY_TO: &'static str = "reply_to_message_id";
    /// `SUCCESS` or `FAILURE`.
    pub const REPLY_OUTCOME: &'static str = "reply_outcome";
    /// Type name of the reply payload.
    pub const REPLY_TYPE: &'static str = "reply_payload_type";
    /// Idempotency lock token for replies of locking handlers.
    pub const LOCKED_TARGET: &'static str = "saga_locked_target";
}
