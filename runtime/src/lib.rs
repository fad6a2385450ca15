//! # Atlas Runtime
//!
//! Consumer runtime for the Atlas event bus.
//!
//! ## Core Components
//!
//! - **[`ConsumerManager`]**: one consumer per topic, handler registration,
//!   graceful shutdown
//! - **Consumer loop**: fetch, dispatch every handler concurrently, commit only
//!   when all of them succeeded
//! - **[`ConsumerConfig`]**: explicit config refined by [`ConsumerOption`]s
//! - **[`retry`]**: bounded exponential backoff for fetches and start-up work
//! - **[`metrics`]** and **[`telemetry`]**: Prometheus export and tracing bootstrap
//!
//! ## Example
//!
//! ```ignore
//! use atlas_core::adapter::{HandlerConfig, adapt};
//! use atlas_runtime::{ConsumerConfig, ConsumerManager};
//!
//! let manager = ConsumerManager::new(reader_factory);
//! manager.add_consumer(ConsumerConfig::from_env(&topics, "wallet_command", "COMMAND_TOPIC_WALLET", "Wallet Service")?)?;
//! manager.register_handler(&topic, adapt(HandlerConfig::persistent("ADJUST_CURRENCY", handle_adjust)))?;
//!
//! tokio::signal::ctrl_c().await?;
//! manager.shutdown().await;
//! ```
//!
//! Records whose handlers fail are re-delivered, so every handler must be
//! idempotent.

pub mod config;
pub mod consumer;
pub mod global;
pub mod manager;
pub mod metrics;
pub mod retry;
pub mod telemetry;

pub use config::{ConfigError, ConsumerConfig, ConsumerOption};
pub use consumer::ConsumerState;
pub use manager::{ConsumerManager, ManagerError};
pub use retry::RetryPolicy;
