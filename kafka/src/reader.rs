//! rdkafka-backed reader.

use crate::convert::to_record;
use atlas_core::reader::{Reader, ReaderConfig, ReaderError, ReaderFactory, ReaderFuture};
use atlas_core::record::Record;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(6);

/// Reader over one subscribed [`StreamConsumer`].
///
/// Auto-commit is disabled; offsets only move through
/// [`commit_messages`](Reader::commit_messages), which blocks until the group
/// coordinator acknowledges so a rejected commit reaches the consumer loop.
pub struct KafkaReader {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaReader {
    /// Create a consumer for `config` and subscribe it to the topic.
    ///
    /// # Errors
    ///
    /// [`ReaderError::Config`] if the client cannot be created or the
    /// subscription is rejected.
    pub fn connect(config: &ReaderConfig, session_timeout: Duration) -> Result<Self, ReaderError> {
        if config.brokers.is_empty() {
            return Err(ReaderError::Config("Brokers not configured".to_string()));
        }
        let brokers = config.brokers.join(",");

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", config.start_offset.as_reset_policy())
            .set("fetch.wait.max.ms", config.max_wait.as_millis().to_string())
            .set("session.timeout.ms", session_timeout.as_millis().to_string())
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| ReaderError::Config(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| ReaderError::Config(format!("Failed to subscribe to '{}': {e}", config.topic)))?;

        tracing::info!(
            brokers = %brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            start_offset = config.start_offset.as_reset_policy(),
            "Kafka reader subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

/// Next offset to commit per partition: one past the highest record seen.
fn commit_positions(records: &[Record]) -> BTreeMap<(&str, i32), i64> {
    let mut positions = BTreeMap::new();
    for record in records {
        let next = record.offset + 1;
        positions
            .entry((record.topic.as_str(), record.partition))
            .and_modify(|o: &mut i64| *o = (*o).max(next))
            .or_insert(next);
    }
    positions
}

impl Reader for KafkaReader {
    fn fetch_message(&mut self) -> ReaderFuture<'_, Record> {
        Box::pin(async move {
            match self.consumer.recv().await {
                Ok(message) => Ok(to_record(&message)),
                Err(e) => Err(ReaderError::Transport(e.to_string())),
            }
        })
    }

    fn commit_messages<'a>(&'a mut self, records: &'a [Record]) -> ReaderFuture<'a, ()> {
        Box::pin(async move {
            let mut list = TopicPartitionList::new();
            for ((topic, partition), offset) in commit_positions(records) {
                list.add_partition_offset(topic, partition, Offset::Offset(offset))
                    .map_err(|e| ReaderError::Commit(e.to_string()))?;
            }
            if list.count() == 0 {
                return Ok(());
            }

            self.consumer
                .commit(&list, CommitMode::Sync)
                .map_err(|e| ReaderError::Commit(e.to_string()))
        })
    }

    fn close(&mut self) -> ReaderFuture<'_, ()> {
        Box::pin(async move {
            self.consumer.unsubscribe();
            tracing::debug!(topic = %self.topic, "Kafka reader closed");
            Ok(())
        })
    }
}

/// Builds a [`KafkaReader`] per consumer registration.
#[derive(Debug, Clone)]
pub struct KafkaReaderFactory {
    session_timeout: Duration,
}

impl KafkaReaderFactory {
    /// Factory with a 6 second session timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Set the group session timeout.
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}

impl Default for KafkaReaderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderFactory for KafkaReaderFactory {
    fn create(&self, config: &ReaderConfig) -> Result<Box<dyn Reader>, ReaderError> {
        Ok(Box::new(KafkaReader::connect(config, self.session_timeout)?))
    }
}
