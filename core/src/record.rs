//! Broker-agnostic inbound record and header map.

use opentelemetry::propagation::{Extractor, Injector};

/// Ordered record headers.
///
/// Brokers allow repeated keys; [`get`](Self::get) returns the last value
/// written for a key, matching how the Kafka clients resolve duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordHeaders {
    entries: Vec<(String, Vec<u8>)>,
}

impl RecordHeaders {
    /// Empty header set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a header, keeping any earlier value for the same key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replace every value for `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
    }

    /// Last raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Last value for `key`, if it is valid UTF-8.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Iterate headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of header entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RecordHeaders
where
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

impl Injector for RecordHeaders {
    fn set(&mut self, key: &str, value: String) {
        Self::set(self, key, value.into_bytes());
    }
}

impl Extractor for RecordHeaders {
    fn get(&self, key: &str) -> Option<&str> {
        self.get_str(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// A record fetched from a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Concrete topic name
    pub topic: String,
    /// Partition the record was read from
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Partitioning key
    pub key: Option<Vec<u8>>,
    /// Payload (JSON envelope for Atlas topics)
    pub value: Vec<u8>,
    /// Tenant and trace headers, plus anything else the producer attached
    pub headers: RecordHeaders,
}

impl Record {
    /// Build a record with no key and no headers.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value: value.into(),
            headers: RecordHeaders::new(),
        }
    }

    /// Attach a key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Replace headers.
    #[must_use]
    pub fn with_headers(mut self, headers: RecordHeaders) -> Self {
        self.headers = headers;
        self
    }
}
