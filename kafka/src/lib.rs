//! Kafka adapter for the Atlas consumer runtime.
//!
//! Implements the [`Reader`](atlas_core::reader::Reader),
//! [`ReaderFactory`](atlas_core::reader::ReaderFactory) and
//! [`Producer`](atlas_core::producer::Producer) contracts on top of rdkafka.
//!
//! # Example
//!
//! ```no_run
//! use atlas_kafka::{KafkaProducer, KafkaReaderFactory};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let readers = KafkaReaderFactory::new();
//! let producer = KafkaProducer::builder()
//!     .brokers(["localhost:9092"])
//!     .acks("all")
//!     .compression("lz4")
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod convert;
mod producer;
mod reader;

pub use producer::{KafkaProducer, KafkaProducerBuilder};
pub use reader::{KafkaReader, KafkaReaderFactory};
