//! Tenant and trace propagation through record headers.
//!
//! Inbound, a consumer applies its [`HeaderParser`] chain left to right to
//! turn a record's headers into an [`OperationContext`]. Outbound, a
//! [`HeaderDecorator`] chain writes the current tenant and span back onto each
//! message before it reaches the producer.
//!
//! Trace context uses the W3C `traceparent`/`tracestate` format.

use crate::context::OperationContext;
use crate::record::RecordHeaders;
use crate::tenant::Tenant;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TraceContextExt;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::fmt;
use std::sync::Arc;

/// Header carrying the tenant UUID.
pub const TENANT_ID_HEADER: &str = "TENANT_ID";
/// Header carrying the tenant region tag.
pub const TENANT_REGION_HEADER: &str = "TENANT_REGION";
/// Header carrying the client major version.
pub const TENANT_MAJOR_VERSION_HEADER: &str = "TENANT_MAJOR_VERSION";
/// Header carrying the client minor version.
pub const TENANT_MINOR_VERSION_HEADER: &str = "TENANT_MINOR_VERSION";
/// W3C trace parent header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

type CustomParser = dyn Fn(OperationContext, &RecordHeaders) -> OperationContext + Send + Sync;

/// One step of the inbound header-parsing chain.
#[derive(Clone)]
pub enum HeaderParser {
    /// Install the tenant carried in the four tenant headers
    Tenant,
    /// Install the remote span carried in `traceparent`
    Span,
    /// Caller-supplied pure transformation
    Custom(Arc<CustomParser>),
}

impl HeaderParser {
    /// Wrap a closure as a parser.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(OperationContext, &RecordHeaders) -> OperationContext + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Apply this parser.
    #[must_use]
    pub fn apply(&self, ctx: OperationContext, headers: &RecordHeaders) -> OperationContext {
        match self {
            Self::Tenant => parse_tenant(ctx, headers),
            Self::Span => parse_span(ctx, headers),
            Self::Custom(f) => f(ctx, headers),
        }
    }
}

impl fmt::Debug for HeaderParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant => f.write_str("Tenant"),
            Self::Span => f.write_str("Span"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Parsers installed by default on every Atlas consumer: span, then tenant.
#[must_use]
pub fn default_parsers() -> Vec<HeaderParser> {
    vec![HeaderParser::Span, HeaderParser::Tenant]
}

/// Apply `parsers` in order.
#[must_use]
pub fn apply_parsers(
    parsers: &[HeaderParser],
    ctx: OperationContext,
    headers: &RecordHeaders,
) -> OperationContext {
    parsers.iter().fold(ctx, |ctx, p| p.apply(ctx, headers))
}

fn parse_tenant(ctx: OperationContext, headers: &RecordHeaders) -> OperationContext {
    let (Some(id), Some(region), Some(major), Some(minor)) = (
        headers.get_str(TENANT_ID_HEADER),
        headers.get_str(TENANT_REGION_HEADER),
        headers.get_str(TENANT_MAJOR_VERSION_HEADER),
        headers.get_str(TENANT_MINOR_VERSION_HEADER),
    ) else {
        return ctx;
    };

    match Tenant::parse(id, region, major, minor) {
        Ok(tenant) => ctx.with_tenant(tenant),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed tenant headers");
            ctx
        }
    }
}

fn parse_span(ctx: OperationContext, headers: &RecordHeaders) -> OperationContext {
    let extracted = TraceContextPropagator::new().extract_with_context(ctx.trace(), headers);
    if extracted.span().span_context().is_valid() {
        ctx.with_trace(extracted)
    } else {
        ctx
    }
}

/// One step of the outbound header-decoration chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDecorator {
    /// Write the context's tenant as the four tenant headers
    Tenant,
    /// Write the context's active span as `traceparent`
    Span,
}

impl HeaderDecorator {
    /// Apply this decorator to `headers`.
    pub fn apply(self, ctx: &OperationContext, headers: &mut RecordHeaders) {
        match self {
            Self::Tenant => {
                if let Some(tenant) = ctx.tenant_opt() {
                    write_tenant(tenant, headers);
                }
            }
            Self::Span => {
                TraceContextPropagator::new().inject_context(ctx.trace(), headers);
            }
        }
    }
}

/// Decorators installed by default on every producer provider.
#[must_use]
pub fn default_decorators() -> Vec<HeaderDecorator> {
    vec![HeaderDecorator::Span, HeaderDecorator::Tenant]
}

/// Write `tenant` into `headers`.
pub fn write_tenant(tenant: &Tenant, headers: &mut RecordHeaders) {
    headers.set(TENANT_ID_HEADER, tenant.id().hyphenated().to_string());
    headers.set(TENANT_REGION_HEADER, tenant.region());
    headers.set(TENANT_MAJOR_VERSION_HEADER, tenant.major_version().to_string());
    headers.set(TENANT_MINOR_VERSION_HEADER, tenant.minor_version().to_string());
}
