//! Producer contract and the context-bound producer provider.
//!
//! A [`Producer`] writes a batch of messages to a concrete topic. A
//! [`ProducerProvider`] wraps a producer together with the topic resolver and
//! the [`OperationContext`] of the current operation: it resolves logical
//! topics, stamps tenant and trace headers on every message, then delegates.

use crate::context::OperationContext;
use crate::message::{Message, MessageError};
use crate::propagation::{HeaderDecorator, default_decorators};
use crate::topic::{TopicError, TopicResolver};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while producing.
#[derive(Error, Debug)]
pub enum ProduceError {
    /// Broker rejected or timed out a write
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// Concrete topic
        topic: String,
        /// Broker-reported reason
        reason: String,
    },

    /// Logical topic could not be resolved
    #[error(transparent)]
    Topic(#[from] TopicError),

    /// Message provider failed
    #[error(transparent)]
    Message(#[from] MessageError),

    /// Producer could not be constructed
    #[error("Producer configuration error: {0}")]
    Config(String),
}

/// Boxed future returned by [`Producer::send`].
pub type ProduceFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProduceError>> + Send + 'a>>;

/// Writes message batches to a broker.
pub trait Producer: Send + Sync {
    /// Write `messages` to `topic` in order.
    ///
    /// # Errors
    ///
    /// [`ProduceError::PublishFailed`] on the first message the broker does
    /// not acknowledge; later messages in the batch are not attempted.
    fn send<'a>(&'a self, topic: &'a str, messages: Vec<Message>) -> ProduceFuture<'a>;
}

/// Producer bound to one operation's context and topic table.
#[derive(Clone)]
pub struct ProducerProvider {
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
    ctx: OperationContext,
    decorators: Vec<HeaderDecorator>,
}

impl ProducerProvider {
    /// Provider with the default tenant and span decorators.
    #[must_use]
    pub fn new(producer: Arc<dyn Producer>, topics: TopicResolver, ctx: OperationContext) -> Self {
        Self {
            producer,
            topics,
            ctx,
            decorators: default_decorators(),
        }
    }

    /// Replace the header decorators.
    #[must_use]
    pub fn with_decorators(mut self, decorators: Vec<HeaderDecorator>) -> Self {
        self.decorators = decorators;
        self
    }

    /// Same producer and topics, bound to another context.
    #[must_use]
    pub fn for_context(&self, ctx: OperationContext) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            topics: self.topics.clone(),
            ctx,
            decorators: self.decorators.clone(),
        }
    }

    /// Context this provider stamps onto outgoing headers.
    #[must_use]
    pub const fn context(&self) -> &OperationContext {
        &self.ctx
    }

    /// Topic resolver in use.
    #[must_use]
    pub const fn topics(&self) -> &TopicResolver {
        &self.topics
    }

    /// Resolve `logical_topic`, run `provider` and send its batch.
    ///
    /// # Errors
    ///
    /// [`ProduceError::Topic`] if the topic key is unset,
    /// [`ProduceError::Message`] if the provider fails, and whatever the
    /// underlying producer reports.
    pub async fn send<P>(&self, logical_topic: &str, provider: P) -> Result<(), ProduceError>
    where
        P: FnOnce() -> Result<Vec<Message>, MessageError>,
    {
        let messages = provider()?;
        self.send_batch(logical_topic, messages).await
    }

    /// Resolve `logical_topic`, decorate and send an already built batch.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_batch(&self, logical_topic: &str, mut messages: Vec<Message>) -> Result<(), ProduceError> {
        let topic = self.topics.resolve(logical_topic)?;
        if messages.is_empty() {
            return Ok(());
        }

        for message in &mut messages {
            for decorator in &self.decorators {
                decorator.apply(&self.ctx, &mut message.headers);
            }
        }

        let count = messages.len();
        self.producer.send(&topic, messages).await?;

        tracing::debug!(
            topic = %topic,
            logical_topic = logical_topic,
            count,
            "Messages sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{create_key, single_message};
    use crate::propagation::{TENANT_ID_HEADER, TENANT_REGION_HEADER};
    use crate::tenant::Tenant;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<(String, Vec<Message>)>>,
    }

    impl Producer for Capture {
        fn send<'a>(&'a self, topic: &'a str, messages: Vec<Message>) -> ProduceFuture<'a> {
            Box::pin(async move {
                self.sent.lock().unwrap().push((topic.to_string(), messages));
                Ok(())
            })
        }
    }

    fn provider(capture: &Arc<Capture>, ctx: OperationContext) -> ProducerProvider {
        ProducerProvider::new(
            Arc::clone(capture) as Arc<dyn Producer>,
            TopicResolver::from_pairs([("EVENT_TOPIC_WALLET_STATUS", "wallet.status")]),
            ctx,
        )
    }

    #[tokio::test]
    async fn test_send_resolves_topic_and_stamps_tenant() {
        let capture = Arc::new(Capture::default());
        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1).unwrap();
        let p = provider(&capture, OperationContext::new().with_tenant(tenant.clone()));

        p.send("EVENT_TOPIC_WALLET_STATUS", || single_message(create_key(1), &"x"))
            .await
            .unwrap();

        let sent = capture.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "wallet.status");
        let headers = &sent[0].1[0].headers;
        assert_eq!(headers.get_str(TENANT_ID_HEADER), Some(tenant.id().to_string().as_str()));
        assert_eq!(headers.get_str(TENANT_REGION_HEADER), Some("GMS"));
    }

    #[tokio::test]
    async fn test_unresolved_topic_sends_nothing() {
        let capture = Arc::new(Capture::default());
        let p = provider(&capture, OperationContext::new());

        let result = p.send("EVENT_TOPIC_UNKNOWN", || single_message(create_key(1), &"x")).await;

        assert!(matches!(result, Err(ProduceError::Topic(TopicError::Unset(_)))));
        assert!(capture.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_provider_sends_nothing() {
        let capture = Arc::new(Capture::default());
        let p = provider(&capture, OperationContext::new());

        let result = p
            .send("EVENT_TOPIC_WALLET_STATUS", || {
                Err(MessageError::Provider("wallet not loaded".into()))
            })
            .await;

        assert!(matches!(result, Err(ProduceError::Message(_))));
        assert!(capture.sent.lock().unwrap().is_empty());
    }
}
