//! Producers that capture or reject writes.

use atlas_core::message::Message;
use atlas_core::producer::{ProduceError, ProduceFuture, Producer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Captures every message sent, in send order.
#[derive(Debug, Default)]
pub struct RecordingProducer {
    sent: Mutex<Vec<(String, Message)>>,
}

impl RecordingProducer {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `(topic, message)` pairs sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages sent to `topic`.
    #[must_use]
    pub fn sent_to(&self, topic: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m)
            .collect()
    }

    /// Values sent to `topic`, parsed as JSON.
    #[must_use]
    pub fn json_sent_to(&self, topic: &str) -> Vec<serde_json::Value> {
        self.sent_to(topic)
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.value).ok())
            .collect()
    }

    /// Whether nothing was sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

impl Producer for RecordingProducer {
    fn send<'a>(&'a self, topic: &'a str, messages: Vec<Message>) -> ProduceFuture<'a> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(messages.into_iter().map(|m| (topic.to_string(), m)));
            Ok(())
        })
    }
}

/// Rejects writes to one topic (or every topic) and records the rest.
#[derive(Debug)]
pub struct FailingProducer {
    topic: Option<String>,
    limit: Option<usize>,
    attempts: AtomicUsize,
    delivered: RecordingProducer,
}

impl FailingProducer {
    /// Reject every write.
    #[must_use]
    pub fn always() -> Self {
        Self {
            topic: None,
            limit: None,
            attempts: AtomicUsize::new(0),
            delivered: RecordingProducer::new(),
        }
    }

    /// Reject writes to `topic` only.
    #[must_use]
    pub fn on_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::always()
        }
    }

    /// Reject the first `failures` writes, then deliver.
    #[must_use]
    pub fn times(failures: usize) -> Self {
        Self {
            limit: Some(failures),
            ..Self::always()
        }
    }

    /// Rejected batches.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Writes that were let through.
    #[must_use]
    pub const fn delivered(&self) -> &RecordingProducer {
        &self.delivered
    }
}

impl FailingProducer {
    fn claim_failure(&self) -> bool {
        match self.limit {
            None => {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(limit) => self
                .attempts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
                .is_ok(),
        }
    }
}

impl Producer for FailingProducer {
    fn send<'a>(&'a self, topic: &'a str, messages: Vec<Message>) -> ProduceFuture<'a> {
        if self.topic.as_deref().is_none_or(|t| t == topic) && self.claim_failure() {
            return Box::pin(async move {
                Err(ProduceError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "broker unavailable".to_string(),
                })
            });
        }
        self.delivered.send(topic, messages)
    }
}
