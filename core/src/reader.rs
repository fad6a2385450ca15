//! Reader abstraction over a broker consumer.
//!
//! A [`Reader`] is owned by exactly one consumer loop: it fetches one record
//! at a time, commits records explicitly and is closed once when the loop
//! drains. The consumer manager receives a [`ReaderFactory`] so tests can
//! substitute an in-memory reader for the Kafka one.

use crate::record::Record;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`Reader`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    /// Reader was closed or reached end of stream; terminal
    #[error("Reader closed")]
    Closed,

    /// Network or broker failure; worth retrying
    #[error("Transport error: {0}")]
    Transport(String),

    /// Commit was rejected
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Reader could not be constructed from its configuration
    #[error("Reader configuration error: {0}")]
    Config(String),
}

impl ReaderError {
    /// Whether a fetch that failed with this error should be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Where a consumer group with no committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartOffset {
    /// Oldest retained record
    #[default]
    First,
    /// Only records produced after the group joins
    Last,
}

impl StartOffset {
    /// Kafka `auto.offset.reset` value.
    #[must_use]
    pub const fn as_reset_policy(self) -> &'static str {
        match self {
            Self::First => "earliest",
            Self::Last => "latest",
        }
    }
}

/// Everything a [`ReaderFactory`] needs to build a reader for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Bootstrap brokers
    pub brokers: Vec<String>,
    /// Concrete topic name
    pub topic: String,
    /// Consumer group
    pub group_id: String,
    /// Upper bound the broker may wait to fill a fetch (advisory)
    pub max_wait: Duration,
    /// Reset policy for groups without a committed offset
    pub start_offset: StartOffset,
}

/// Boxed future returned by [`Reader`] methods.
pub type ReaderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ReaderError>> + Send + 'a>>;

/// Fetch, commit and close against one topic.
///
/// Cancellation is handled by the caller dropping the `fetch_message`
/// future; implementations must therefore be cancel-safe in `fetch_message`.
pub trait Reader: Send {
    /// Wait for the next record.
    ///
    /// # Errors
    ///
    /// [`ReaderError::Closed`] once the reader can produce no more records;
    /// [`ReaderError::Transport`] for transient broker failures.
    fn fetch_message(&mut self) -> ReaderFuture<'_, Record>;

    /// Commit `records` so the group does not see them again.
    ///
    /// # Errors
    ///
    /// [`ReaderError::Commit`] if the broker rejects the commit.
    fn commit_messages<'a>(&'a mut self, records: &'a [Record]) -> ReaderFuture<'a, ()>;

    /// Release broker resources.
    ///
    /// # Errors
    ///
    /// Implementation-specific; the runtime logs and ignores close failures.
    fn close(&mut self) -> ReaderFuture<'_, ()>;
}

/// Builds readers for consumer registrations.
pub trait ReaderFactory: Send + Sync {
    /// Build a reader for `config`.
    ///
    /// # Errors
    ///
    /// [`ReaderError::Config`] if the configuration is unusable.
    fn create(&self, config: &ReaderConfig) -> Result<Box<dyn Reader>, ReaderError>;
}

impl<F> ReaderFactory for F
where
    F: Fn(&ReaderConfig) -> Result<Box<dyn Reader>, ReaderError> + Send + Sync,
{
    fn create(&self, config: &ReaderConfig) -> Result<Box<dyn Reader>, ReaderError> {
        self(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(ReaderError::Transport("broker down".into()).is_transient());
        assert!(!ReaderError::Closed.is_transient());
        assert!(!ReaderError::Commit("rebalance".into()).is_transient());
        assert!(!ReaderError::Config("no brokers".into()).is_transient());
    }

    #[test]
    fn test_start_offset_reset_policy() {
        assert_eq!(StartOffset::default(), StartOffset::First);
        assert_eq!(StartOffset::First.as_reset_policy(), "earliest");
        assert_eq!(StartOffset::Last.as_reset_policy(), "latest");
    }
}
