//! The message envelope.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{MessageError, Result};
use crate::headers::Headers;

/// A message travelling between services: a JSON payload plus headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    headers: Headers,
    payload: serde_json::Value,
}

impl Message {
    /// Unique id, stamped before the message leaves the process.
    pub const ID: &'static str = "id";
    /// Channel the message was sent to.
    pub const DESTINATION: &'static str = "destination";
    /// Creation timestamp, RFC 3339 in UTC.
    pub const DATE: &'static str = "date";
    /// Transport-level correlation id, carried unchanged onto replies.
    pub const CORRELATION_ID: &'static str = "correlation_id";

    /// Creates a message with the given payload and no headers.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            headers: Headers::new(),
            payload,
        }
    }

    /// Creates a message by serializing a value as its payload.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(payload)?))
    }

    /// Creates a message with an explicit payload and header set.
    pub fn with_headers(payload: serde_json::Value, headers: Headers) -> Self {
        Self { headers, payload }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Returns the message id, if one has been assigned.
    pub fn id(&self) -> Option<&str> {
        self.header(Self::ID).filter(|id| !id.is_empty())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns a header that must be present.
    pub fn required_header(&self, name: &str) -> Result<&str> {
        self.header(name)
            .ok_or_else(|| MessageError::MissingRequiredHeader(name.to_string()))
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Sets a header in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header, consuming and returning the message.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Copies every header of `extra` onto this message.
    pub fn with_extra_headers(mut self, extra: &Headers) -> Self {
        self.headers.extend(extra);
        self
    }

    /// Decodes the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Message(headers={}, payload={})", self.headers, self.payload)
    }
}
