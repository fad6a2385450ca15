//! Typed handlers and the adapter that turns them into raw [`Handler`]s.
//!
//! A typed handler receives an already-decoded payload. The adapter performs
//! the decoding in two stages so that many typed handlers can share one topic:
//!
//! 1. decode only the envelope's `type`; a record for another discriminator is
//!    skipped without error;
//! 2. decode the full payload; a failure here is [`HandlerError::Malformed`]
//!    and withholds the offset, since it means a producer is emitting records
//!    this service cannot read.
//!
//! # Example
//!
//! ```
//! use atlas_core::adapter::{adapt, HandlerConfig};
//! use atlas_core::context::OperationContext;
//! use atlas_core::envelope::StatusEvent;
//! use atlas_core::handler::HandlerError;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Created { name: String }
//!
//! let handler = adapt(HandlerConfig::persistent(
//!     "CREATED",
//!     |_ctx: OperationContext, event: StatusEvent<Created>| async move {
//!         tracing::info!(name = %event.body.name, "account created");
//!         Ok::<_, HandlerError>(())
//!     },
//! ));
//! # let _ = handler;
//! ```

use crate::context::OperationContext;
use crate::envelope::EnvelopeHead;
use crate::handler::{Disposition, Handler, HandlerError, HandlerFuture};
use crate::record::Record;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`TypedHandler::handle`].
pub type TypedHandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// A handler over a decoded payload `T`.
pub trait TypedHandler<T>: Send + Sync {
    /// Process one decoded payload.
    fn handle(&self, ctx: OperationContext, payload: T) -> TypedHandlerFuture;
}

impl<T, F, Fut> TypedHandler<T> for F
where
    F: Fn(OperationContext, T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, ctx: OperationContext, payload: T) -> TypedHandlerFuture {
        Box::pin(self(ctx, payload))
    }
}

/// A typed handler plus the rules for when it runs and how long it lives.
pub struct HandlerConfig<T> {
    discriminator: Option<String>,
    persistent: bool,
    handler: Arc<dyn TypedHandler<T>>,
}

impl<T> HandlerConfig<T> {
    /// Handler for records whose `type` equals `discriminator`, living as
    /// long as its consumer.
    pub fn persistent<H>(discriminator: impl Into<String>, handler: H) -> Self
    where
        H: TypedHandler<T> + 'static,
    {
        Self {
            discriminator: Some(discriminator.into()),
            persistent: true,
            handler: Arc::new(handler),
        }
    }

    /// Handler for records whose `type` equals `discriminator`, removed after
    /// its first successful invocation.
    pub fn one_shot<H>(discriminator: impl Into<String>, handler: H) -> Self
    where
        H: TypedHandler<T> + 'static,
    {
        Self {
            discriminator: Some(discriminator.into()),
            persistent: false,
            handler: Arc::new(handler),
        }
    }

    /// Persistent handler for a single-type topic: every record is decoded
    /// as `T`, with no discriminator check.
    pub fn any<H>(handler: H) -> Self
    where
        H: TypedHandler<T> + 'static,
    {
        Self {
            discriminator: None,
            persistent: true,
            handler: Arc::new(handler),
        }
    }

    /// Discriminator this handler accepts, if any.
    #[must_use]
    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    /// Whether the handler survives a successful invocation.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.persistent
    }
}

struct Adapted<T> {
    discriminator: Option<String>,
    persistent: bool,
    handler: Arc<dyn TypedHandler<T>>,
}

impl<T> Adapted<T> {
    fn accepts(&self, record: &Record) -> Result<bool, HandlerError> {
        let Some(expected) = self.discriminator.as_deref() else {
            return Ok(true);
        };
        let head: EnvelopeHead = serde_json::from_slice(&record.value)?;
        Ok(head.kind.as_deref() == Some(expected))
    }
}

impl<T> Handler for Adapted<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn handle(&self, ctx: OperationContext, record: Arc<Record>) -> HandlerFuture {
        match self.accepts(&record) {
            Ok(true) => {}
            Ok(false) => return Box::pin(async { Ok(Disposition::Keep) }),
            Err(e) => {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Unable to read record envelope"
                );
                return Box::pin(async move { Err(e) });
            }
        }

        let payload: T = match serde_json::from_slice(&record.value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    discriminator = self.discriminator.as_deref().unwrap_or("*"),
                    error = %e,
                    "Unable to decode record payload"
                );
                return Box::pin(async move { Err(HandlerError::from(e)) });
            }
        };

        let disposition = if self.persistent {
            Disposition::Keep
        } else {
            Disposition::Remove
        };
        let fut = self.handler.handle(ctx, payload);
        Box::pin(async move { fut.await.map(|()| disposition) })
    }
}

/// Wrap a typed handler as a raw [`Handler`].
pub fn adapt<T>(config: HandlerConfig<T>) -> Arc<dyn Handler>
where
    T: DeserializeOwned + Send + 'static,
{
    Arc::new(Adapted {
        discriminator: config.discriminator,
        persistent: config.persistent,
        handler: config.handler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Command, MovementCommand};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Adjust {
        amount: i32,
    }

    fn record(value: &str) -> Arc<Record> {
        Arc::new(Record::new("COMMAND_TOPIC_WALLET", 0, 0, value))
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn(OperationContext, Command<Adjust>) -> std::future::Ready<Result<(), HandlerError>>
    + Send
    + Sync
    + 'static {
        let calls = Arc::clone(calls);
        move |_ctx, cmd| {
            assert_eq!(cmd.body.amount, 5);
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_matching_discriminator_invokes_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = adapt(HandlerConfig::persistent("ADJUST", counting(&calls)));

        let result = handler
            .handle(OperationContext::new(), record(r#"{"type":"ADJUST","body":{"amount":5}}"#))
            .await;

        assert_eq!(result, Ok(Disposition::Keep));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_discriminator_is_skipped_even_with_foreign_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = adapt(HandlerConfig::persistent("ADJUST", counting(&calls)));

        let result = handler
            .handle(
                OperationContext::new(),
                record(r#"{"type":"RENAME","body":{"name":"x"}}"#),
            )
            .await;

        assert_eq!(result, Ok(Disposition::Keep));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_withholds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = adapt(HandlerConfig::persistent("ADJUST", counting(&calls)));

        let result = handler
            .handle(
                OperationContext::new(),
                record(r#"{"type":"ADJUST","body":{"amount":"lots"}}"#),
            )
            .await;

        assert!(matches!(result, Err(HandlerError::Malformed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_json_withholds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = adapt(HandlerConfig::persistent("ADJUST", counting(&calls)));

        let result = handler.handle(OperationContext::new(), record("not json")).await;

        assert!(matches!(result, Err(HandlerError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_typed_error_propagates() {
        let handler = adapt(HandlerConfig::persistent(
            "ADJUST",
            |_ctx: OperationContext, _cmd: Command<Adjust>| async {
                Err::<(), _>(HandlerError::failed("wallet locked"))
            },
        ));

        let result = handler
            .handle(OperationContext::new(), record(r#"{"type":"ADJUST","body":{"amount":5}}"#))
            .await;

        assert_eq!(result, Err(HandlerError::Failed("wallet locked".to_string())));
    }

    #[tokio::test]
    async fn test_one_shot_requests_removal_after_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = adapt(HandlerConfig::one_shot("ADJUST", counting(&calls)));

        let result = handler
            .handle(OperationContext::new(), record(r#"{"type":"ADJUST","body":{"amount":5}}"#))
            .await;

        assert_eq!(result, Ok(Disposition::Remove));
    }

    #[tokio::test]
    async fn test_single_type_topic_needs_no_discriminator() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in = Arc::clone(&seen);
        let handler = adapt(HandlerConfig::any(
            move |_ctx: OperationContext, movement: MovementCommand| {
                seen_in.store(usize::try_from(movement.object_id).unwrap_or(0), Ordering::SeqCst);
                async { Ok::<(), HandlerError>(()) }
            },
        ));

        let value = r#"{"worldId":0,"channelId":1,"mapId":100000000,"objectId":42,"observerId":7,"x":1,"y":2,"stance":3}"#;
        let result = handler.handle(OperationContext::new(), record(value)).await;

        assert_eq!(result, Ok(Disposition::Keep));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
