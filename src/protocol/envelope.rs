//! Generic envelope
//!
//! The untyped, wire-level view of a message: a JSON object whose reserved
//! keys name the variant and whose remaining entries are the variant's fields.

use serde_json::{Map, Value};

use super::{DecodeError, Message, MessageKind, NAMESPACE_KEY, TYPE_NAME_KEY};

/// Type discriminator carried by an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub type_name: String,
    pub namespace: String,
}

impl Tag {
    pub fn new(type_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            namespace: namespace.into(),
        }
    }

    /// Remove the reserved keys from an object and return the tag they form.
    ///
    /// Returns `Ok(None)` when neither key is present.
    pub fn take_from(object: &mut Map<String, Value>) -> Result<Option<Self>, DecodeError> {
        match (object.remove(TYPE_NAME_KEY), object.remove(NAMESPACE_KEY)) {
            (None, None) => Ok(None),
            (Some(Value::String(type_name)), Some(Value::String(namespace))) => {
                Ok(Some(Self { type_name, namespace }))
            }
            _ => Err(DecodeError::Malformed(format!(
                "type tag needs string '{}' and '{}' keys",
                TYPE_NAME_KEY, NAMESPACE_KEY
            ))),
        }
    }

    /// Check if an object carries either reserved key
    pub fn is_tagged(object: &Map<String, Value>) -> bool {
        object.contains_key(TYPE_NAME_KEY) || object.contains_key(NAMESPACE_KEY)
    }
}

impl From<MessageKind> for Tag {
    fn from(kind: MessageKind) -> Self {
        Self::new(kind.type_name(), kind.namespace())
    }
}

/// A parsed, not yet validated message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Type tag, absent for untyped values
    pub tag: Option<Tag>,
    /// Remaining entries of the object
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Build the envelope for a typed message
    pub fn from_message(message: &Message) -> serde_json::Result<Self> {
        Ok(Self {
            tag: Some(message.kind().into()),
            fields: message.fields()?,
        })
    }

    /// Parse raw bytes into an envelope
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        match value {
            Value::Object(mut fields) => {
                let tag = Tag::take_from(&mut fields)?;
                Ok(Self { tag, fields })
            }
            _ => Err(DecodeError::UntaggedTopLevel),
        }
    }

    /// Serialize with the reserved keys first, followed by the fields in order
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut object = Map::with_capacity(self.fields.len() + 2);
        if let Some(tag) = &self.tag {
            object.insert(TYPE_NAME_KEY.to_string(), Value::String(tag.type_name.clone()));
            object.insert(NAMESPACE_KEY.to_string(), Value::String(tag.namespace.clone()));
        }
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        serde_json::to_vec(&Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UpperRequest;

    #[test]
    fn test_reserved_keys_come_first() {
        let message = Message::UpperRequest(UpperRequest {
            text: "hello".to_string(),
        });
        let bytes = Envelope::from_message(&message).unwrap().to_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"type-name":"UpperRequest","namespace":"local","text":"hello"}"#
        );
    }

    #[test]
    fn test_parse_splits_tag_from_fields() {
        let envelope =
            Envelope::parse(br#"{"text":"hi","namespace":"local","type-name":"UpperRequest"}"#)
                .unwrap();
        assert_eq!(envelope.tag, Some(Tag::new("UpperRequest", "local")));
        assert_eq!(envelope.fields.len(), 1);
        assert_eq!(envelope.fields["text"], "hi");
    }

    #[test]
    fn test_parse_untagged_object() {
        let envelope = Envelope::parse(br#"{"text":"hi"}"#).unwrap();
        assert!(envelope.tag.is_none());
    }

    #[test]
    fn test_parse_non_object() {
        let err = Envelope::parse(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DecodeError::UntaggedTopLevel));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = Envelope::parse(b"{\"type-name\": ").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_partial_tag_is_malformed() {
        let err = Envelope::parse(br#"{"type-name":"UpperRequest","text":"hi"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = Envelope::parse(br#"{"type-name":"UpperRequest","namespace":7}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
