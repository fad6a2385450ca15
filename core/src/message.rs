//! Outbound messages and the providers that build them.
//!
//! A *provider* is a deferred computation that yields the `(key, value)` pairs
//! to publish. Domain code hands providers to a
//! [`Buffer`](crate::buffer::Buffer) or a
//! [`ProducerProvider`](crate::producer::ProducerProvider); the provider runs
//! once, at the moment it is handed over.

use crate::record::RecordHeaders;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building outbound messages.
#[derive(Error, Debug)]
pub enum MessageError {
    /// Value could not be serialized to JSON
    #[error("Failed to serialize message value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Domain-specific provider failure
    #[error("Message provider failed: {0}")]
    Provider(String),
}

/// A message ready to hand to a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Partitioning key
    pub key: Vec<u8>,
    /// Serialized payload
    pub value: Vec<u8>,
    /// Headers; decorated with tenant and trace just before sending
    pub headers: RecordHeaders,
}

impl Message {
    /// Build a message with no headers.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            headers: RecordHeaders::new(),
        }
    }
}

/// Key for an entity identified by an integer id (ASCII decimal).
#[must_use]
pub fn create_key(id: i64) -> Vec<u8> {
    id.to_string().into_bytes()
}

/// Key for an entity identified by a UUID (hyphenated).
#[must_use]
pub fn uuid_key(id: Uuid) -> Vec<u8> {
    id.hyphenated().to_string().into_bytes()
}

/// Provider of one JSON-encoded message.
///
/// # Errors
///
/// Returns [`MessageError::Serialization`] if `value` cannot be encoded.
pub fn single_message<T: Serialize>(key: Vec<u8>, value: &T) -> Result<Vec<Message>, MessageError> {
    Ok(vec![Message::new(key, serde_json::to_vec(value)?)])
}

/// Provider of several JSON-encoded messages, in iteration order.
///
/// # Errors
///
/// Returns the first serialization error; no partial batch is returned.
pub fn messages<T, I>(items: I) -> Result<Vec<Message>, MessageError>
where
    T: Serialize,
    I: IntoIterator<Item = (Vec<u8>, T)>,
{
    items
        .into_iter()
        .map(|(key, value)| Ok(Message::new(key, serde_json::to_vec(&value)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_key_is_ascii_decimal() {
        assert_eq!(create_key(1_000_042), b"1000042".to_vec());
        assert_eq!(create_key(-7), b"-7".to_vec());
    }

    #[test]
    fn test_uuid_key_is_hyphenated() {
        let id = Uuid::nil();
        assert_eq!(uuid_key(id), b"00000000-0000-0000-0000-000000000000".to_vec());
    }

    #[test]
    fn test_single_message_encodes_json() {
        let batch = single_message(create_key(5), &json!({"type": "CREATED"})).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].key, b"5".to_vec());
        assert_eq!(batch[0].value, br#"{"type":"CREATED"}"#.to_vec());
        assert!(batch[0].headers.is_empty());
    }

    #[test]
    fn test_messages_preserves_order() {
        let batch = messages([(create_key(1), 10), (create_key(2), 20)]).unwrap();
        assert_eq!(batch.iter().map(|m| m.value.clone()).collect::<Vec<_>>(), vec![b"10".to_vec(), b"20".to_vec()]);
    }
}
