//! Consumer configuration.
//!
//! A [`ConsumerConfig`] is built once per topic registration and refined with
//! [`ConsumerOption`]s before the manager constructs the reader.

use atlas_core::propagation::HeaderParser;
use atlas_core::reader::{ReaderConfig, StartOffset};
use atlas_core::topic::{TopicError, TopicResolver};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the comma-separated broker list.
pub const BOOTSTRAP_SERVERS: &str = "BOOTSTRAP_SERVERS";

const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(50);

/// Errors raised while building a consumer configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Topic key or broker variable could not be resolved
    #[error(transparent)]
    Resolve(#[from] TopicError),

    /// Broker variable was set but listed no brokers
    #[error("No brokers configured in BOOTSTRAP_SERVERS")]
    NoBrokers,
}

/// Broker list from [`BOOTSTRAP_SERVERS`], comma separated and trimmed.
///
/// # Errors
///
/// [`ConfigError::Resolve`] if the variable is unset or empty,
/// [`ConfigError::NoBrokers`] if it lists only separators.
pub fn brokers(resolver: &TopicResolver) -> Result<Vec<String>, ConfigError> {
    let brokers: Vec<String> = resolver
        .resolve(BOOTSTRAP_SERVERS)?
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(String::from)
        .collect();

    if brokers.is_empty() {
        return Err(ConfigError::NoBrokers);
    }
    Ok(brokers)
}

/// Refinement applied to a [`ConsumerConfig`].
#[derive(Debug, Clone)]
pub enum ConsumerOption {
    /// Reset policy for groups without a committed offset
    StartOffset(StartOffset),
    /// Advisory fetch wait
    MaxWait(Duration),
    /// Header parsers applied to every record, in order
    HeaderParsers(Vec<HeaderParser>),
}

/// Everything needed to run one consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Name used for the per-record span and in logs
    pub name: String,
    /// Bootstrap brokers
    pub brokers: Vec<String>,
    /// Concrete topic
    pub topic: String,
    /// Consumer group
    pub group_id: String,
    /// Advisory fetch wait
    pub max_wait: Duration,
    /// Reset policy
    pub start_offset: StartOffset,
    /// Parsers turning record headers into an operation context
    pub header_parsers: Vec<HeaderParser>,
}

impl ConsumerConfig {
    /// Config with a 50ms max wait, [`StartOffset::First`] and no parsers.
    #[must_use]
    pub fn new(
        brokers: Vec<String>,
        name: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            brokers,
            topic: topic.into(),
            group_id: group_id.into(),
            max_wait: DEFAULT_MAX_WAIT,
            start_offset: StartOffset::default(),
            header_parsers: Vec::new(),
        }
    }

    /// Resolve `topic_key` and [`BOOTSTRAP_SERVERS`] through `resolver`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Resolve`] if either variable is unset or empty,
    /// [`ConfigError::NoBrokers`] if the broker list is only separators.
    pub fn from_env(
        resolver: &TopicResolver,
        name: impl Into<String>,
        topic_key: &str,
        group_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let topic = resolver.resolve(topic_key)?;
        Ok(Self::new(brokers(resolver)?, name, topic, group_id))
    }

    /// Apply one option.
    #[must_use]
    pub fn with_option(mut self, option: ConsumerOption) -> Self {
        match option {
            ConsumerOption::StartOffset(offset) => self.start_offset = offset,
            ConsumerOption::MaxWait(wait) => self.max_wait = wait,
            ConsumerOption::HeaderParsers(parsers) => self.header_parsers = parsers,
        }
        self
    }

    /// Apply several options in order.
    #[must_use]
    pub fn with_options(self, options: impl IntoIterator<Item = ConsumerOption>) -> Self {
        options.into_iter().fold(self, Self::with_option)
    }

    /// Reader-facing subset of this config.
    #[must_use]
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            brokers: self.brokers.clone(),
            topic: self.topic.clone(),
            group_id: self.group_id.clone(),
            max_wait: self.max_wait,
            start_offset: self.start_offset,
        }
    }
}
