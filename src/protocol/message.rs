//! Protocol message definitions
//!
//! Defines every message shape a tagrpc service can send or receive. The set is
//! closed: a message on the wire can only ever be reconstructed as one of the
//! variants of [`Message`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use super::{LOCAL_NAMESPACE, RECIPE_NAMESPACE};

/// Request for the list of known crafting materials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialRequest {}

/// Distinct values of each material column of the recipe table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialRequestReply {
    pub material1: BTreeSet<String>,
    pub material2: BTreeSet<String>,
}

/// Request to combine two materials, written as `"m1,m2"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeCreateRequest {
    pub materials: String,
}

impl RecipeCreateRequest {
    pub fn new(material1: &str, material2: &str) -> Self {
        Self {
            materials: format!("{},{}", material1, material2),
        }
    }
}

/// Outcome of a crafting request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeCreateReply {
    pub result: String,
}

/// Text to convert to upper case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpperRequest {
    pub text: String,
}

/// Upper-cased text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpperReply {
    pub result: String,
}

/// Error carrier, sent in place of any reply when processing fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceException {
    pub message: String,
}

impl ServiceException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One row of the recipe store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeRow {
    pub material1: String,
    pub material2: String,
    pub result: String,
}

/// Discriminant of a [`Message`], i.e. what the envelope tag names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    MaterialRequest,
    MaterialRequestReply,
    RecipeCreateRequest,
    RecipeCreateReply,
    UpperRequest,
    UpperReply,
    ServiceException,
    RecipeRow,
}

impl MessageKind {
    /// Every kind known to the protocol
    pub const ALL: [MessageKind; 8] = [
        MessageKind::MaterialRequest,
        MessageKind::MaterialRequestReply,
        MessageKind::RecipeCreateRequest,
        MessageKind::RecipeCreateReply,
        MessageKind::UpperRequest,
        MessageKind::UpperReply,
        MessageKind::ServiceException,
        MessageKind::RecipeRow,
    ];

    /// Value of the `type-name` envelope key
    pub fn type_name(self) -> &'static str {
        match self {
            MessageKind::MaterialRequest => "MaterialRequest",
            MessageKind::MaterialRequestReply => "MaterialRequestReply",
            MessageKind::RecipeCreateRequest => "RecipeCreateRequest",
            MessageKind::RecipeCreateReply => "RecipeCreateReply",
            MessageKind::UpperRequest => "UpperRequest",
            MessageKind::UpperReply => "UpperReply",
            MessageKind::ServiceException => "ServiceException",
            MessageKind::RecipeRow => "RecipeRow",
        }
    }

    /// Value of the `namespace` envelope key
    pub fn namespace(self) -> &'static str {
        match self {
            MessageKind::RecipeRow => RECIPE_NAMESPACE,
            _ => LOCAL_NAMESPACE,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace(), self.type_name())
    }
}

/// All possible protocol messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    MaterialRequest(MaterialRequest),
    MaterialRequestReply(MaterialRequestReply),
    RecipeCreateRequest(RecipeCreateRequest),
    RecipeCreateReply(RecipeCreateReply),
    UpperRequest(UpperRequest),
    UpperReply(UpperReply),
    ServiceException(ServiceException),
    RecipeRow(RecipeRow),
}

impl Message {
    /// Shorthand for a [`ServiceException`] message
    pub fn exception(message: impl Into<String>) -> Self {
        Message::ServiceException(ServiceException::new(message))
    }

    /// Get the message kind
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::MaterialRequest(_) => MessageKind::MaterialRequest,
            Message::MaterialRequestReply(_) => MessageKind::MaterialRequestReply,
            Message::RecipeCreateRequest(_) => MessageKind::RecipeCreateRequest,
            Message::RecipeCreateReply(_) => MessageKind::RecipeCreateReply,
            Message::UpperRequest(_) => MessageKind::UpperRequest,
            Message::UpperReply(_) => MessageKind::UpperReply,
            Message::ServiceException(_) => MessageKind::ServiceException,
            Message::RecipeRow(_) => MessageKind::RecipeRow,
        }
    }

    /// Check if this is an error reply
    pub fn is_exception(&self) -> bool {
        matches!(self, Message::ServiceException(_))
    }

    /// The message's own fields, without the reserved envelope keys
    pub fn fields(&self) -> serde_json::Result<Map<String, Value>> {
        let value = match self {
            Message::MaterialRequest(m) => serde_json::to_value(m)?,
            Message::MaterialRequestReply(m) => serde_json::to_value(m)?,
            Message::RecipeCreateRequest(m) => serde_json::to_value(m)?,
            Message::RecipeCreateReply(m) => serde_json::to_value(m)?,
            Message::UpperRequest(m) => serde_json::to_value(m)?,
            Message::UpperReply(m) => serde_json::to_value(m)?,
            Message::ServiceException(m) => serde_json::to_value(m)?,
            Message::RecipeRow(m) => serde_json::to_value(m)?,
        };

        match value {
            Value::Object(fields) => Ok(fields),
            other => Err(serde::ser::Error::custom(format!(
                "{} did not serialize to an object: {}",
                self.kind(),
                other
            ))),
        }
    }

    /// Populate the shape named by `kind` from envelope fields
    pub fn from_fields(kind: MessageKind, fields: Map<String, Value>) -> serde_json::Result<Self> {
        let value = Value::Object(fields);
        let message = match kind {
            MessageKind::MaterialRequest => Message::MaterialRequest(serde_json::from_value(value)?),
            MessageKind::MaterialRequestReply => {
                Message::MaterialRequestReply(serde_json::from_value(value)?)
            }
            MessageKind::RecipeCreateRequest => {
                Message::RecipeCreateRequest(serde_json::from_value(value)?)
            }
            MessageKind::RecipeCreateReply => {
                Message::RecipeCreateReply(serde_json::from_value(value)?)
            }
            MessageKind::UpperRequest => Message::UpperRequest(serde_json::from_value(value)?),
            MessageKind::UpperReply => Message::UpperReply(serde_json::from_value(value)?),
            MessageKind::ServiceException => {
                Message::ServiceException(serde_json::from_value(value)?)
            }
            MessageKind::RecipeRow => Message::RecipeRow(serde_json::from_value(value)?),
        };
        Ok(message)
    }
}

macro_rules! impl_from_shape {
    ($($shape:ident),+ $(,)?) => {
        $(
            impl From<$shape> for Message {
                fn from(shape: $shape) -> Self {
                    Message::$shape(shape)
                }
            }
        )+
    };
}

impl_from_shape!(
    MaterialRequest,
    MaterialRequestReply,
    RecipeCreateRequest,
    RecipeCreateReply,
    UpperRequest,
    UpperReply,
    ServiceException,
    RecipeRow,
);

/// A message a client may send, paired with the reply a handler produces for it
pub trait Request: Into<Message> + Sized + Send + 'static {
    /// Kind under which handlers for this request are registered
    const KIND: MessageKind;

    /// Successful reply shape
    type Reply: Into<Message> + TryFrom<Message, Error = Message>;

    /// Extract the request from a message of the matching kind
    fn from_message(message: Message) -> Option<Self>;
}

impl Request for UpperRequest {
    const KIND: MessageKind = MessageKind::UpperRequest;
    type Reply = UpperReply;

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::UpperRequest(request) => Some(request),
            _ => None,
        }
    }
}

impl Request for MaterialRequest {
    const KIND: MessageKind = MessageKind::MaterialRequest;
    type Reply = MaterialRequestReply;

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::MaterialRequest(request) => Some(request),
            _ => None,
        }
    }
}

impl Request for RecipeCreateRequest {
    const KIND: MessageKind = MessageKind::RecipeCreateRequest;
    type Reply = RecipeCreateReply;

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::RecipeCreateRequest(request) => Some(request),
            _ => None,
        }
    }
}

macro_rules! impl_try_from_message {
    ($($shape:ident),+ $(,)?) => {
        $(
            impl TryFrom<Message> for $shape {
                type Error = Message;

                fn try_from(message: Message) -> Result<Self, Message> {
                    match message {
                        Message::$shape(reply) => Ok(reply),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

impl_try_from_message!(UpperReply, MaterialRequestReply, RecipeCreateReply);
