//! Logical-to-concrete topic resolution.
//!
//! Code names topics by a symbolic key such as `EVENT_TOPIC_WALLET_STATUS`;
//! the deployment decides the concrete topic name by setting an environment
//! variable of that same name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while resolving a topic key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// No value configured for the key
    #[error("Topic '{0}' is not configured")]
    Unset(String),

    /// Configured value was blank
    #[error("Topic '{0}' is configured with an empty name")]
    Empty(String),
}

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Resolves logical topic keys to concrete names.
#[derive(Clone)]
pub struct TopicResolver {
    lookup: Arc<Lookup>,
}

impl TopicResolver {
    /// Resolve from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    /// Resolve from a fixed table.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_lookup(move |key| table.get(key).cloned())
    }

    /// Resolve `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError::Unset`] when the key has no value and
    /// [`TopicError::Empty`] when its value is blank.
    pub fn resolve(&self, key: &str) -> Result<String, TopicError> {
        let value = (self.lookup)(key).ok_or_else(|| TopicError::Unset(key.to_string()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(TopicError::Empty(key.to_string()));
        }
        Ok(value.to_string())
    }

    /// Raw value for a non-topic setting (e.g. `BOOTSTRAP_SERVERS`) through
    /// the same source.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }
}

impl fmt::Debug for TopicResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_from_pairs() {
        let topics = TopicResolver::from_pairs([("EVENT_TOPIC_WALLET_STATUS", "wallet.status")]);
        assert_eq!(topics.resolve("EVENT_TOPIC_WALLET_STATUS").unwrap(), "wallet.status");
    }

    #[test]
    fn test_unset_key_is_error() {
        let topics = TopicResolver::from_pairs(Vec::<(String, String)>::new());
        assert_eq!(
            topics.resolve("COMMAND_TOPIC_WALLET"),
            Err(TopicError::Unset("COMMAND_TOPIC_WALLET".to_string()))
        );
    }

    #[test]
    fn test_blank_value_is_error() {
        let topics = TopicResolver::from_pairs([("T", "  ")]);
        assert_eq!(topics.resolve("T"), Err(TopicError::Empty("T".to_string())));
    }

    #[test]
    fn test_env_resolver_reports_missing_variable() {
        let topics = TopicResolver::from_env();
        assert!(topics.resolve("ATLAS_TOPIC_THAT_IS_NEVER_SET_4f1c").is_err());
    }
}
