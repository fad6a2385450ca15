//! Tenants, trace contexts and records for tests.

use atlas_core::context::OperationContext;
use atlas_core::propagation::{HeaderDecorator, write_tenant};
use atlas_core::record::{Record, RecordHeaders};
use atlas_core::tenant::Tenant;
use opentelemetry::Context as OtelContext;
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use std::sync::Once;
use uuid::Uuid;

/// Tenant id used by [`test_tenant`].
pub const TEST_TENANT_ID: Uuid = Uuid::from_u128(0x0192_4f3a_83aa_7c1e_9b1d_6c2f_0a11_0001);

/// The GMS v83.1 tenant used throughout the tests.
///
/// # Panics
///
/// Never in practice; the hardcoded region is non-empty.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_tenant() -> Tenant {
    Tenant::new(TEST_TENANT_ID, "GMS", 83, 1).expect("hardcoded tenant should always be valid")
}

/// Context carrying [`test_tenant`].
#[must_use]
pub fn tenant_context() -> OperationContext {
    OperationContext::new().with_tenant(test_tenant())
}

/// OpenTelemetry context whose active span is a sampled remote span.
#[must_use]
pub fn remote_trace(trace_id: TraceId, span_id: SpanId) -> OtelContext {
    OtelContext::new().with_remote_span_context(SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    ))
}

/// Builder for inbound records.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    topic: String,
    partition: i32,
    offset: i64,
    key: Option<Vec<u8>>,
    value: Vec<u8>,
    headers: RecordHeaders,
}

/// Start building a record on `topic`.
#[must_use]
pub fn record(topic: impl Into<String>) -> RecordBuilder {
    RecordBuilder {
        topic: topic.into(),
        partition: 0,
        offset: 0,
        key: None,
        value: Vec::new(),
        headers: RecordHeaders::new(),
    }
}

impl RecordBuilder {
    /// Set the offset.
    #[must_use]
    pub const fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the partition.
    #[must_use]
    pub const fn partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    /// Set the key.
    #[must_use]
    pub fn key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the raw value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    /// Set the value to the JSON encoding of `value`.
    ///
    /// # Panics
    ///
    /// If `value` cannot be serialized.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        self.value = serde_json::to_vec(value).expect("test payload should serialize");
        self
    }

    /// Add the four tenant headers.
    #[must_use]
    pub fn tenant(mut self, tenant: &Tenant) -> Self {
        write_tenant(tenant, &mut self.headers);
        self
    }

    /// Add a `traceparent` header for the given ids.
    #[must_use]
    pub fn trace(mut self, trace_id: TraceId, span_id: SpanId) -> Self {
        let ctx = OperationContext::new().with_trace(remote_trace(trace_id, span_id));
        HeaderDecorator::Span.apply(&ctx, &mut self.headers);
        self
    }

    /// Add an arbitrary header.
    #[must_use]
    pub fn header(mut self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.headers.append(key, value);
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> Record {
        let record = Record::new(self.topic, self.partition, self.offset, self.value).with_headers(self.headers);
        match self.key {
            Some(key) => record.with_key(key),
            None => record,
        }
    }
}

static TRACER: Once = Once::new();

/// Install an SDK tracer provider (no exporter) as the global provider so
/// spans started by the runtime get real ids.
pub fn install_test_tracer() {
    TRACER.call_once(|| {
        let provider = opentelemetry_sdk::trace::TracerProvider::builder().build();
        opentelemetry::global::set_tracer_provider(provider);
    });
}

static LOGGING: Once = Once::new();

/// Route `tracing` output to the test harness's captured writer.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::propagation::{apply_parsers, default_parsers};

    #[test]
    fn test_record_builder_headers_parse_back() {
        let trace_id = TraceId::from_hex("0102030405060708090a0b0c0d0e0f10").unwrap();
        let span_id = SpanId::from_hex("0102030405060708").unwrap();
        let rec = record("t")
            .offset(4)
            .key("1")
            .value("x")
            .tenant(&test_tenant())
            .trace(trace_id, span_id)
            .build();

        let ctx = apply_parsers(&default_parsers(), OperationContext::new(), &rec.headers);
        assert_eq!(ctx.tenant().unwrap(), &test_tenant());
        assert_eq!(ctx.span_context().trace_id(), trace_id);
        assert_eq!(rec.offset, 4);
        assert_eq!(rec.key.as_deref(), Some(b"1".as_slice()));
    }
}
