//! Run a business operation against a fresh buffer, then publish it.
//!
//! ```text
//!   emit_with_result(producer, op)
//!        │
//!        ├─ buffer = Buffer::new()
//!        ├─ op(&mut buffer) ──── Err ──► return Err, nothing published
//!        │        │
//!        │        Ok(result)
//!        ▼
//!   for (topic, batch) in buffer ── send ── Err ──► return first error
//!        │                                         (later batches abandoned)
//!        ▼
//!   Ok(result)
//! ```
//!
//! Domain code that binds a database mutation to its events does: begin
//! transaction, mutate, append to the buffer, commit, and only then lets the
//! wrapper flush. A crash between commit and send loses those events; there
//! is no durable outbox. Downstream handlers must tolerate that through
//! idempotency and re-delivery of the inbound command.

use crate::buffer::Buffer;
use crate::producer::{ProduceError, ProducerProvider};
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors raised while publishing a buffer.
#[derive(Error, Debug)]
pub enum EmitError {
    /// A batch could not be published
    #[error("Failed to emit to '{topic}': {source}")]
    Publish {
        /// Logical topic of the failed batch
        topic: String,
        /// Underlying producer error
        #[source]
        source: ProduceError,
    },
}

/// Publish every batch in `buffer`, stopping at the first failure.
///
/// # Errors
///
/// [`EmitError::Publish`] for the first batch that fails; batches after it
/// are not attempted, batches before it stay published.
pub async fn flush(producer: &ProducerProvider, buffer: Buffer) -> Result<(), EmitError> {
    for (topic, batch) in buffer.into_batches() {
        let count = batch.len() as u64;
        if let Err(source) = producer.send_batch(&topic, batch).await {
            tracing::error!(
                topic = %topic,
                error = %source,
                "Unable to emit buffered messages"
            );
            metrics::counter!("emit_failures_total").increment(1);
            return Err(EmitError::Publish { topic, source });
        }
        metrics::counter!("emit_messages_sent_total").increment(count);
    }
    Ok(())
}

/// Run `op` against a fresh buffer and publish the buffer if it succeeds.
///
/// `op` receives the buffer by mutable reference; write it as
/// `|buf| Box::pin(async move { ... })`.
///
/// # Errors
///
/// Returns `op`'s error untouched (nothing is published), or the
/// [`EmitError`] from [`flush`] converted into `E`.
pub async fn emit_with_result<T, E, F>(producer: &ProducerProvider, op: F) -> Result<T, E>
where
    F: for<'b> FnOnce(&'b mut Buffer) -> BoxFuture<'b, Result<T, E>>,
    E: From<EmitError>,
{
    let mut buffer = Buffer::new();
    let result = op(&mut buffer).await?;
    flush(producer, buffer).await?;
    Ok(result)
}

/// [`emit_with_result`] for operations with no result value.
///
/// # Errors
///
/// See [`emit_with_result`].
pub async fn emit<E, F>(producer: &ProducerProvider, op: F) -> Result<(), E>
where
    F: for<'b> FnOnce(&'b mut Buffer) -> BoxFuture<'b, Result<(), E>>,
    E: From<EmitError>,
{
    emit_with_result(producer, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OperationContext;
    use crate::message::{Message, MessageError, create_key, single_message};
    use crate::producer::{ProduceFuture, Producer};
    use crate::topic::TopicResolver;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Error)]
    enum OpError {
        #[error("business rule violated")]
        Rule,
        #[error(transparent)]
        Message(#[from] MessageError),
        #[error(transparent)]
        Emit(#[from] EmitError),
    }

    #[derive(Default)]
    struct Capture {
        fail_topic: Option<String>,
        sent: Mutex<Vec<String>>,
    }

    impl Producer for Capture {
        fn send<'a>(&'a self, topic: &'a str, _messages: Vec<Message>) -> ProduceFuture<'a> {
            Box::pin(async move {
                if self.fail_topic.as_deref() == Some(topic) {
                    return Err(ProduceError::PublishFailed {
                        topic: topic.to_string(),
                        reason: "broker unavailable".into(),
                    });
                }
                self.sent.lock().unwrap().push(topic.to_string());
                Ok(())
            })
        }
    }

    fn provider(capture: Arc<Capture>) -> ProducerProvider {
        ProducerProvider::new(
            capture,
            TopicResolver::from_pairs([("A", "topic.a"), ("B", "topic.b")]),
            OperationContext::new(),
        )
    }

    #[tokio::test]
    async fn test_failed_operation_publishes_nothing() {
        let capture = Arc::new(Capture::default());
        let p = provider(Arc::clone(&capture));

        let result: Result<(), OpError> = emit(&p, |buf| {
            Box::pin(async move {
                buf.put("A", || single_message(create_key(1), &"staged"))?;
                Err(OpError::Rule)
            })
        })
        .await;

        assert!(matches!(result, Err(OpError::Rule)));
        assert!(capture.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_operation_flushes_and_returns_result() {
        let capture = Arc::new(Capture::default());
        let p = provider(Arc::clone(&capture));

        let result: Result<u32, OpError> = emit_with_result(&p, |buf| {
            Box::pin(async move {
                buf.put("A", || single_message(create_key(1), &1))?;
                buf.put("B", || single_message(create_key(1), &2))?;
                Ok(42)
            })
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*capture.sent.lock().unwrap(), vec!["topic.a".to_string(), "topic.b".to_string()]);
    }

    #[tokio::test]
    async fn test_first_publish_error_abandons_remaining_batches() {
        let capture = Arc::new(Capture {
            fail_topic: Some("topic.a".into()),
            ..Capture::default()
        });
        let p = provider(Arc::clone(&capture));

        let result: Result<(), OpError> = emit(&p, |buf| {
            Box::pin(async move {
                buf.put("A", || single_message(create_key(1), &1))?;
                buf.put("B", || single_message(create_key(1), &2))?;
                Ok(())
            })
        })
        .await;

        assert!(matches!(result, Err(OpError::Emit(EmitError::Publish { ref topic, .. })) if topic == "A"));
        assert!(capture.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_buffer_sends_nothing() {
        let capture = Arc::new(Capture::default());
        let p = provider(Arc::clone(&capture));

        let result: Result<(), OpError> = emit(&p, |_buf| Box::pin(async { Ok(()) })).await;

        assert!(result.is_ok());
        assert!(capture.sent.lock().unwrap().is_empty());
    }
}
