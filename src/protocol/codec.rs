//! Protocol codec for encoding/decoding messages
//!
//! Turns typed messages into envelope bytes and back, using a [`Registry`] to
//! decide which tags may be reconstructed.

use serde_json::Value;
use thiserror::Error;

use super::{Envelope, Message, MessageKind, Registry, ResolveError, Tag, DEFAULT_MAX_MESSAGE_SIZE};

/// Last-resort reply text, short enough to fit under [`super::MIN_MESSAGE_SIZE`]
const REPLY_TOO_LARGE: &str = "reply too large";

/// Errors raised while turning bytes into a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Refusing to reconstruct message: {0}")]
    UnknownType(#[from] ResolveError),

    #[error("Message carries no type tag")]
    UntaggedTopLevel,

    #[error("Message does not match {kind}: {detail}")]
    ShapeMismatch { kind: MessageKind, detail: String },

    #[error("Message too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),

    #[error("Timed out waiting for message")]
    Timeout,
}

/// Errors raised while turning a message into bytes
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),
}

/// Encodes messages into the wire format
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    max_message_size: usize,
}

impl Encoder {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Encode a message, failing if the result exceeds the size cap
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, EncodeError> {
        let bytes = Envelope::from_message(message)?.to_bytes()?;

        if bytes.len() > self.max_message_size {
            return Err(EncodeError::TooLarge(bytes.len(), self.max_message_size));
        }

        Ok(bytes)
    }

    /// Encode a reply, substituting a `ServiceException` if the reply itself
    /// cannot be encoded.
    ///
    /// The substitute carries the failure when it fits, otherwise a fixed
    /// short text that fits under any cap of at least [`super::MIN_MESSAGE_SIZE`].
    pub fn encode_reply(&self, reply: &Message) -> Result<Vec<u8>, EncodeError> {
        let err = match self.encode(reply) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };
        tracing::warn!("Failed to encode {} reply: {}", reply.kind(), err);

        let detailed = Message::exception(format!(
            "Failed to encode {} reply: {}",
            reply.kind().type_name(),
            err
        ));
        self.encode(&detailed)
            .or_else(|_| self.encode(&Message::exception(REPLY_TOO_LARGE)))
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

/// Decodes messages from the wire format
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    registry: Registry,
    max_message_size: usize,
}

impl Decoder {
    pub fn new(registry: Registry, max_message_size: usize) -> Self {
        Self {
            registry,
            max_message_size,
        }
    }

    /// Decode a complete message
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        if bytes.len() > self.max_message_size {
            return Err(DecodeError::TooLarge(bytes.len(), self.max_message_size));
        }

        let envelope = Envelope::parse(bytes)?;
        let tag = envelope.tag.ok_or(DecodeError::UntaggedTopLevel)?;

        let kind = self.registry.resolve(&tag.type_name, &tag.namespace)?;

        for value in envelope.fields.values() {
            self.check_nested(value)?;
        }

        Message::from_fields(kind, envelope.fields).map_err(|e| DecodeError::ShapeMismatch {
            kind,
            detail: e.to_string(),
        })
    }

    /// Nested objects may be untyped, but tagged ones must still pass the registry
    fn check_nested(&self, value: &Value) -> Result<(), DecodeError> {
        match value {
            Value::Object(object) => {
                if Tag::is_tagged(object) {
                    let mut object = object.clone();
                    if let Some(tag) = Tag::take_from(&mut object)? {
                        self.registry.resolve(&tag.type_name, &tag.namespace)?;
                    }
                }
                for nested in object.values() {
                    self.check_nested(nested)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    self.check_nested(item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry
    }
}
