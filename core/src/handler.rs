//! Raw record handlers.
//!
//! A [`Handler`] receives every record fetched on the topic it is registered
//! to, together with the [`OperationContext`] derived from that record's
//! headers. Its result drives two decisions in the consumer runtime:
//!
//! - `Err(_)` withholds the record's offset (the record will be re-delivered);
//! - `Ok(Disposition::Remove)` unregisters the handler after this record.
//!
//! Because failed records are re-delivered, handlers must be idempotent.

use crate::context::OperationContext;
use crate::record::Record;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors a handler can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Record value could not be decoded into the handler's payload type
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Handler body failed
    #[error("Handler failed: {0}")]
    Failed(String),

    /// Handler task panicked (reported by the runtime, never returned by a handler)
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wrap any displayable error as [`HandlerError::Failed`].
    pub fn failed(err: impl fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<crate::context::ContextError> for HandlerError {
    fn from(err: crate::context::ContextError) -> Self {
        Self::failed(err)
    }
}

/// What to do with a handler after it processed a record successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Stay registered
    #[default]
    Keep,
    /// Unregister after this record
    Remove,
}

impl Disposition {
    /// `continue` flag in the `(continue, error)` vocabulary.
    #[must_use]
    pub const fn should_continue(self) -> bool {
        matches!(self, Self::Keep)
    }
}

/// Identifier assigned to a handler at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for HandlerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Boxed future returned by [`Handler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Disposition, HandlerError>> + Send>>;

/// A raw record handler.
///
/// Returns a `'static` future so the runtime can run each handler in its own
/// task. Implemented for any `Fn(OperationContext, Arc<Record>) -> Future`.
///
/// # Example
///
/// ```
/// use atlas_core::handler::{Disposition, Handler, HandlerError};
/// use atlas_core::record::Record;
/// use atlas_core::context::OperationContext;
/// use std::sync::Arc;
///
/// let handler = |_ctx: OperationContext, record: Arc<Record>| async move {
///     tracing::info!(offset = record.offset, "seen");
///     Ok::<_, HandlerError>(Disposition::Keep)
/// };
/// let _boxed: Arc<dyn Handler> = Arc::new(handler);
/// ```
pub trait Handler: Send + Sync {
    /// Process one record.
    fn handle(&self, ctx: OperationContext, record: Arc<Record>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(OperationContext, Arc<Record>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Disposition, HandlerError>> + Send + 'static,
{
    fn handle(&self, ctx: OperationContext, record: Arc<Record>) -> HandlerFuture {
        Box::pin(self(ctx, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler: Arc<dyn Handler> = Arc::new(|_ctx: OperationContext, record: Arc<Record>| async move {
            if record.value == b"stop" {
                Ok::<_, HandlerError>(Disposition::Remove)
            } else {
                Ok(Disposition::Keep)
            }
        });

        let keep = handler
            .handle(OperationContext::new(), Arc::new(Record::new("t", 0, 0, "go")))
            .await;
        let stop = handler
            .handle(OperationContext::new(), Arc::new(Record::new("t", 0, 1, "stop")))
            .await;

        assert_eq!(keep, Ok(Disposition::Keep));
        assert_eq!(stop, Ok(Disposition::Remove));
    }

    #[test]
    fn test_handler_ids_are_unique() {
        assert_ne!(HandlerId::new(), HandlerId::new());
    }

    #[test]
    fn test_disposition_continue_flag() {
        assert!(Disposition::Keep.should_continue());
        assert!(!Disposition::Remove.should_continue());
    }
}
