//! Consumer manager: one consumer per topic, handler registration, shutdown.

use crate::config::ConsumerConfig;
use crate::consumer::{Consumer, ConsumerState};
use crate::retry::RetryPolicy;
use atlas_core::handler::{Handler, HandlerId};
use atlas_core::reader::{ReaderError, ReaderFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Errors returned by [`ConsumerManager`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// No consumer was added for the topic
    #[error("No consumer registered for topic '{0}'")]
    NoConsumerForTopic(String),

    /// Reader factory refused the configuration
    #[error("Unable to create reader: {0}")]
    Reader(#[from] ReaderError),
}

/// Owns the consumers of a process.
///
/// Every consumer's cancellation token is a child of the manager's root
/// token, so [`shutdown`](Self::shutdown) stops them all.
pub struct ConsumerManager {
    factory: Arc<dyn ReaderFactory>,
    retry: RetryPolicy,
    root: CancellationToken,
    tracker: TaskTracker,
    consumers: Mutex<HashMap<String, Arc<Consumer>>>,
}

impl ConsumerManager {
    /// Manager building readers with `factory` and the default fetch retry policy.
    #[must_use]
    pub fn new(factory: Arc<dyn ReaderFactory>) -> Self {
        Self::with_retry_policy(factory, RetryPolicy::default())
    }

    /// Manager with an explicit fetch retry policy.
    #[must_use]
    pub fn with_retry_policy(factory: Arc<dyn ReaderFactory>, retry: RetryPolicy) -> Self {
        Self {
            factory,
            retry,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            consumers: Mutex::new(HashMap::new()),
        }
    }

    fn consumers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Consumer>>> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn consumer(&self, topic: &str) -> Result<Arc<Consumer>, ManagerError> {
        self.consumers()
            .get(topic)
            .cloned()
            .ok_or_else(|| ManagerError::NoConsumerForTopic(topic.to_string()))
    }

    /// Build a reader for `config` and start its consumer loop.
    ///
    /// A second call for a topic that already has a consumer logs and does
    /// nothing. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Reader`] if the reader factory rejects the config.
    pub fn add_consumer(&self, config: ConsumerConfig) -> Result<(), ManagerError> {
        let mut consumers = self.consumers();
        if consumers.contains_key(&config.topic) {
            tracing::info!(
                consumer = %config.name,
                topic = %config.topic,
                "Consumer already registered for topic"
            );
            return Ok(());
        }

        let reader = self.factory.create(&config.reader_config())?;
        let consumer = Arc::new(Consumer::new(
            config.name.clone(),
            config.topic.clone(),
            config.header_parsers,
            self.root.child_token(),
            self.retry.clone(),
        ));
        consumers.insert(config.topic.clone(), Arc::clone(&consumer));
        self.tracker.spawn(consumer.run(reader));

        tracing::info!(
            consumer = %config.name,
            topic = %config.topic,
            group_id = %config.group_id,
            "Consumer added"
        );
        Ok(())
    }

    /// Register `handler` on `topic`; it sees records from the next fetch on.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NoConsumerForTopic`] if no consumer was added for `topic`.
    pub fn register_handler(&self, topic: &str, handler: Arc<dyn Handler>) -> Result<HandlerId, ManagerError> {
        let id = self.consumer(topic)?.register(handler);
        tracing::debug!(topic, handler_id = %id, "Handler registered");
        Ok(id)
    }

    /// Unregister `id` from `topic`. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NoConsumerForTopic`] if no consumer was added for `topic`.
    pub fn remove_handler(&self, topic: &str, id: HandlerId) -> Result<(), ManagerError> {
        if self.consumer(topic)?.unregister(id) {
            tracing::debug!(topic, handler_id = %id, "Handler removed");
        }
        Ok(())
    }

    /// [`add_consumer`](Self::add_consumer) followed by
    /// [`register_handler`](Self::register_handler).
    ///
    /// # Errors
    ///
    /// See [`add_consumer`](Self::add_consumer).
    pub fn add_consumer_and_register(
        &self,
        config: ConsumerConfig,
        handler: Arc<dyn Handler>,
    ) -> Result<HandlerId, ManagerError> {
        let topic = config.topic.clone();
        self.add_consumer(config)?;
        self.register_handler(&topic, handler)
    }

    /// Current state of the consumer on `topic`.
    #[must_use]
    pub fn state(&self, topic: &str) -> Option<ConsumerState> {
        self.consumer(topic).ok().map(|c| c.state())
    }

    /// Wait until the consumer on `topic` reaches `state` or a later one.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NoConsumerForTopic`] if no consumer was added for `topic`.
    pub async fn wait_for_state(&self, topic: &str, state: ConsumerState) -> Result<(), ManagerError> {
        let consumer = self.consumer(topic)?;
        consumer.wait_for_state(state).await;
        Ok(())
    }

    /// Handler tasks currently running on `topic`.
    #[must_use]
    pub fn in_flight(&self, topic: &str) -> Option<usize> {
        self.consumer(topic).ok().map(|c| c.in_flight())
    }

    /// Handlers registered on `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> Option<usize> {
        self.consumer(topic).ok().map(|c| c.handler_count())
    }

    /// Topics with a consumer.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.consumers().keys().cloned().collect()
    }

    /// Root token; cancelled by [`shutdown`](Self::shutdown).
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.root
    }

    /// Cancel every consumer and wait until each has terminated.
    ///
    /// In-flight handlers are not interrupted; they observe cancellation
    /// through their context and the wait lasts until they return.
    pub async fn shutdown(&self) {
        tracing::info!(consumers = self.consumers().len(), "Initiating consumer shutdown");
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("All consumers terminated");
    }
}

impl std::fmt::Debug for ConsumerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerManager")
            .field("topics", &self.topics())
            .field("cancelled", &self.root.is_cancelled())
            .finish_non_exhaustive()
    }
}
