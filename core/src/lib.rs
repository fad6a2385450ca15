//! # Atlas Core
//!
//! Contracts shared by every Atlas service that talks to the event bus.
//!
//! ## Consuming
//!
//! - [`record::Record`]: one fetched record with its headers
//! - [`propagation::HeaderParser`]: turns headers into an [`context::OperationContext`]
//! - [`handler::Handler`]: raw record handler returning a [`handler::Disposition`]
//! - [`adapter::HandlerConfig`] / [`adapter::adapt`]: typed, discriminator-filtered handlers
//! - [`reader::Reader`] / [`reader::ReaderFactory`]: the broker seam
//!
//! ## Producing
//!
//! - [`message::Message`] and the key helpers
//! - [`producer::ProducerProvider`]: resolves logical topics and stamps headers
//! - [`buffer::Buffer`] / [`emit::emit`]: stage messages during an operation,
//!   publish only if it succeeds
//!
//! ## Shared model
//!
//! - [`tenant::Tenant`], [`envelope`] command/status-event shapes,
//!   [`saga::Saga`]

pub mod adapter;
pub mod buffer;
pub mod context;
pub mod emit;
pub mod envelope;
pub mod handler;
pub mod message;
pub mod producer;
pub mod propagation;
pub mod reader;
pub mod record;
pub mod saga;
pub mod tenant;
pub mod topic;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use context::OperationContext;
pub use handler::{Disposition, Handler, HandlerError, HandlerId};
pub use record::{Record, RecordHeaders};
pub use tenant::Tenant;
