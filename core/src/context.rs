//! Per-operation context.
//!
//! An [`OperationContext`] travels with every record from the moment its
//! headers are parsed until the last handler returns. It carries the tenant,
//! the OpenTelemetry context holding the current span, and the consumer's
//! cancellation token so long-running handlers can observe shutdown.

use crate::tenant::Tenant;
use opentelemetry::Context as OtelContext;
use opentelemetry::trace::{Span, SpanContext, TraceContextExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised when reading from an [`OperationContext`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// No tenant was attached to the context
    #[error("No tenant attached to operation context")]
    MissingTenant,
}

/// Context for one unit of work (one record, one REST call, one saga step).
///
/// Cheap to clone: the tenant is small, the OpenTelemetry context is
/// reference counted and the cancellation token is an `Arc` internally.
#[derive(Clone, Debug, Default)]
pub struct OperationContext {
    tenant: Option<Tenant>,
    trace: OtelContext,
    cancellation: CancellationToken,
}

impl OperationContext {
    /// Empty context with a fresh, never-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty context bound to an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            tenant: None,
            trace: OtelContext::new(),
            cancellation,
        }
    }

    /// Copy of this context with `tenant` attached.
    #[must_use]
    pub fn with_tenant(mut self, tenant: Tenant) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Tenant attached to this context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingTenant`] when no tenant header was
    /// parsed for this operation.
    pub fn tenant(&self) -> Result<&Tenant, ContextError> {
        self.tenant.as_ref().ok_or(ContextError::MissingTenant)
    }

    /// Tenant, if any.
    #[must_use]
    pub const fn tenant_opt(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    /// Copy of this context with the OpenTelemetry context replaced.
    #[must_use]
    pub fn with_trace(mut self, trace: OtelContext) -> Self {
        self.trace = trace;
        self
    }

    /// Copy of this context with `span` installed as the active span.
    #[must_use]
    pub fn with_span<S>(mut self, span: S) -> Self
    where
        S: Span + Send + Sync + 'static,
    {
        self.trace = self.trace.with_span(span);
        self
    }

    /// Underlying OpenTelemetry context.
    #[must_use]
    pub const fn trace(&self) -> &OtelContext {
        &self.trace
    }

    /// Span context of the active span (invalid if none).
    #[must_use]
    pub fn span_context(&self) -> SpanContext {
        self.trace.span().span_context().clone()
    }

    /// Cancellation token shared with the owning consumer.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the owning consumer has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanId, TraceFlags, TraceId, TraceState};
    use uuid::Uuid;

    #[test]
    fn test_missing_tenant_is_an_error() {
        let ctx = OperationContext::new();
        assert_eq!(ctx.tenant(), Err(ContextError::MissingTenant));
    }

    #[test]
    fn test_with_tenant() {
        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1).unwrap();
        let ctx = OperationContext::new().with_tenant(tenant.clone());
        assert_eq!(ctx.tenant().unwrap(), &tenant);
    }

    #[test]
    fn test_remote_span_context_is_visible() {
        let remote = SpanContext::new(
            TraceId::from_bytes([1; 16]),
            SpanId::from_bytes([2; 8]),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let ctx = OperationContext::new()
            .with_trace(OtelContext::new().with_remote_span_context(remote.clone()));
        assert_eq!(ctx.span_context().trace_id(), remote.trace_id());
        assert_eq!(ctx.span_context().span_id(), remote.span_id());
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = OperationContext::with_cancellation(token.clone());
        let copy = ctx.clone();
        assert!(!copy.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(copy.is_cancelled());
    }
}
