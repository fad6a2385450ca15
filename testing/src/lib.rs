//! # Atlas Testing
//!
//! Deterministic stand-ins for the broker seams plus tenant and trace
//! fixtures.
//!
//! ## Example
//!
//! ```ignore
//! use atlas_testing::{StaticReaderFactory, test_tenant, record};
//!
//! #[tokio::test]
//! async fn test_handler_sees_tenant() {
//!     let factory = Arc::new(StaticReaderFactory::new());
//!     let feed = factory.channel("t");
//!     let manager = ConsumerManager::new(factory);
//!     // ... add consumer, register handler
//!     feed.send(record("t").tenant(&test_tenant()).value("x").build());
//! }
//! ```

pub mod fixtures;
pub mod producers;
pub mod readers;

// Re-export commonly used items
pub use fixtures::{
    RecordBuilder, TEST_TENANT_ID, init_test_logging, install_test_tracer, record, remote_trace, tenant_context,
    test_tenant,
};
pub use producers::{FailingProducer, RecordingProducer};
pub use readers::{ChannelReader, ChannelReaderHandle, ReaderProbe, ScriptedReader, Step, StaticReaderFactory};
