//! rdkafka-backed producer.

use crate::convert::to_owned_headers;
use atlas_core::message::Message;
use atlas_core::producer::{ProduceError, ProduceFuture, Producer};
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

const DEFAULT_ACKS: &str = "1";
const DEFAULT_COMPRESSION: &str = "none";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer writing keyed messages with headers through a [`FutureProducer`].
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
}

impl KafkaProducer {
    /// Start configuring a producer.
    #[must_use]
    pub fn builder() -> KafkaProducerBuilder {
        KafkaProducerBuilder::default()
    }

    /// Comma-separated bootstrap brokers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

impl std::fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("brokers", &self.brokers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`KafkaProducer`].
#[derive(Debug, Default)]
pub struct KafkaProducerBuilder {
    brokers: Vec<String>,
    acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaProducerBuilder {
    /// Set the bootstrap brokers.
    #[must_use]
    pub fn brokers<I, S>(mut self, brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.brokers = brokers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "1"
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the per-message delivery timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the producer.
    ///
    /// # Errors
    ///
    /// [`ProduceError::Config`] if no brokers were given or the client
    /// cannot be created.
    pub fn build(self) -> Result<KafkaProducer, ProduceError> {
        if self.brokers.is_empty() {
            return Err(ProduceError::Config("Brokers not configured".to_string()));
        }
        let brokers = self.brokers.join(",");
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.acks.as_deref().unwrap_or(DEFAULT_ACKS);
        let compression = self.compression.as_deref().unwrap_or(DEFAULT_COMPRESSION);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| ProduceError::Config(format!("Failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            "Kafka producer created"
        );

        Ok(KafkaProducer {
            producer,
            brokers,
            timeout,
        })
    }
}

impl Producer for KafkaProducer {
    fn send<'a>(&'a self, topic: &'a str, messages: Vec<Message>) -> ProduceFuture<'a> {
        Box::pin(async move {
            for message in &messages {
                let record = FutureRecord::to(topic)
                    .key(message.key.as_slice())
                    .payload(message.value.as_slice())
                    .headers(to_owned_headers(&message.headers));

                match self.producer.send(record, Timeout::After(self.timeout)).await {
                    Ok((partition, offset)) => {
                        tracing::trace!(topic, partition, offset, "Message delivered");
                    }
                    Err((kafka_error, _)) => {
                        tracing::error!(topic, error = %kafka_error, "Failed to deliver message");
                        return Err(ProduceError::PublishFailed {
                            topic: topic.to_string(),
                            reason: kafka_error.to_string(),
                        });
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_producer_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<KafkaProducer>();
        assert_sync::<KafkaProducer>();
    }

    #[test]
    fn test_builder_requires_brokers() {
        let result = KafkaProducer::builder().acks("all").build();
        assert!(matches!(result, Err(ProduceError::Config(_))));
    }
}
