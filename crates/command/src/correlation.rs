//! Correlation headers echoed from a command onto its replies.

use message::{Headers, Message};

use crate::headers::{CommandMessageHeaders, ReplyMessageHeaders};

/// Computes the headers every reply to `message` must carry.
///
/// Each `command_<x>` header is echoed as `reply_<x>`, the request id becomes
/// `reply_to_message_id`, and a transport `correlation_id` is copied as is.
/// The inbound message is not modified.
pub fn correlate_message_headers(message: &Message) -> Headers {
    let mut correlated: Headers = message
        .headers()
        .iter()
        .filter(|(name, _)| name.starts_with(CommandMessageHeaders::COMMAND_HEADER_PREFIX))
        .map(|(name, value)| (CommandMessageHeaders::in_reply(name), value.to_string()))
        .collect();

    if let Some(id) = message.id() {
        correlated.insert(ReplyMessageHeaders::IN_REPLY_TO, id);
    }
    if let Some(correlation_id) = message.header(Message::CORRELATION_ID) {
        correlated.insert(Message::CORRELATION_ID, correlation_id);
    }
    correlated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> Message {
        Message::new(serde_json::Value::Null)
            .with_header(Message::ID, "m-1")
            .with_header(Message::DESTINATION, "customers")
            .with_header(CommandMessageHeaders::COMMAND_TYPE, "ReserveCredit")
            .with_header("command_saga_type", "CreateOrderSaga")
            .with_header("command_saga_id", "s-1")
            .with_header(Message::CORRELATION_ID, "corr-9")
    }

    #[test]
    fn saga_headers_are_remapped() {
        let headers = correlate_message_headers(&inbound());

        assert_eq!(headers.get("reply_saga_type"), Some("CreateOrderSaga"));
        assert_eq!(headers.get("reply_saga_id"), Some("s-1"));
        assert_eq!(headers.get("reply_type"), Some("ReserveCredit"));
        assert_eq!(headers.get(ReplyMessageHeaders::IN_REPLY_TO), Some("m-1"));
        assert_eq!(headers.get(Message::CORRELATION_ID), Some("corr-9"));
    }

    #[test]
    fn transport_headers_are_not_echoed() {
        let headers = correlate_message_headers(&inbound());

        assert!(!headers.contains(Message::ID));
        assert!(!headers.contains(Message::DESTINATION));
        assert!(!headers.contains("command_saga_id"));
    }

    #[test]
    fn derivation_is_deterministic() {
        let message = inbound();
        assert_eq!(
            correlate_message_headers(&message),
            correlate_message_headers(&message)
        );
    }
}
