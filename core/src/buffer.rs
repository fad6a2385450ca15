//! Per-operation outbox buffer.
//!
//! Domain code stages outbound messages in a [`Buffer`] while it performs a
//! business operation. The buffer is published only after the operation
//! succeeds (see [`emit`](crate::emit)); if the operation fails the buffer is
//! dropped and nothing reaches the broker.
//!
//! Within a logical topic messages keep append order. Across topics there is
//! no ordering.

use crate::message::{Message, MessageError};
use std::collections::HashMap;

/// Staging area for one business operation's outbound messages.
///
/// Not shared across tasks: an operation owns its buffer and hands out
/// `&mut Buffer` to the steps that append to it.
#[derive(Debug, Default)]
pub struct Buffer {
    batches: HashMap<String, Vec<Message>>,
    order: Vec<String>,
}

impl Buffer {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `provider` now and append its messages under `logical_topic`.
    ///
    /// The provider runs at append time, so the values captured reflect the
    /// state at the moment the domain code decided to emit.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; the buffer is left unchanged.
    pub fn put<P>(&mut self, logical_topic: &str, provider: P) -> Result<(), MessageError>
    where
        P: FnOnce() -> Result<Vec<Message>, MessageError>,
    {
        let messages = provider()?;
        self.append(logical_topic, messages);
        Ok(())
    }

    /// Append already built messages under `logical_topic`.
    pub fn append(&mut self, logical_topic: &str, messages: Vec<Message>) {
        if !self.batches.contains_key(logical_topic) {
            self.order.push(logical_topic.to_string());
        }
        self.batches
            .entry(logical_topic.to_string())
            .or_default()
            .extend(messages);
    }

    /// Staged batches by logical topic.
    #[must_use]
    pub const fn get_all(&self) -> &HashMap<String, Vec<Message>> {
        &self.batches
    }

    /// Staged messages for one topic.
    #[must_use]
    pub fn get(&self, logical_topic: &str) -> &[Message] {
        self.batches.get(logical_topic).map_or(&[], Vec::as_slice)
    }

    /// Total staged messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.values().map(Vec::len).sum()
    }

    /// Whether nothing was staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the buffer into `(logical_topic, batch)` pairs, in the order
    /// topics were first touched.
    #[must_use]
    pub fn into_batches(mut self) -> Vec<(String, Vec<Message>)> {
        self.order
            .into_iter()
            .filter_map(|topic| self.batches.remove(&topic).map(|batch| (topic, batch)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{create_key, single_message};

    #[test]
    fn test_put_preserves_append_order_within_topic() {
        let mut buffer = Buffer::new();
        buffer.put("A", || single_message(create_key(1), &1)).unwrap();
        buffer.put("B", || single_message(create_key(2), &2)).unwrap();
        buffer.put("A", || single_message(create_key(3), &3)).unwrap();

        let a: Vec<_> = buffer.get("A").iter().map(|m| m.value.clone()).collect();
        assert_eq!(a, vec![b"1".to_vec(), b"3".to_vec()]);
        assert_eq!(buffer.get("B").len(), 1);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_provider_runs_at_put_time() {
        let mut balance = 10;
        let mut buffer = Buffer::new();
        buffer.put("A", || single_message(create_key(1), &balance)).unwrap();
        balance += 5;

        assert_eq!(balance, 15);
        assert_eq!(buffer.get("A")[0].value, b"10".to_vec());
    }

    #[test]
    fn test_failed_provider_leaves_buffer_unchanged() {
        let mut buffer = Buffer::new();
        let result = buffer.put("A", || Err(MessageError::Provider("boom".into())));

        assert!(result.is_err());
        assert!(buffer.is_empty());
        assert!(buffer.get_all().is_empty());
    }

    #[test]
    fn test_into_batches_orders_by_first_touch() {
        let mut buffer = Buffer::new();
        buffer.put("B", || single_message(create_key(1), &1)).unwrap();
        buffer.put("A", || single_message(create_key(2), &2)).unwrap();
        buffer.put("B", || single_message(create_key(3), &3)).unwrap();

        let topics: Vec<_> = buffer.into_batches().into_iter().map(|(t, b)| (t, b.len())).collect();
        assert_eq!(topics, vec![("B".to_string(), 2), ("A".to_string(), 1)]);
    }
}
