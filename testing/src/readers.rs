//! In-memory readers for driving consumer loops deterministically.

use atlas_core::reader::{Reader, ReaderConfig, ReaderError, ReaderFactory, ReaderFuture};
use atlas_core::record::{Record, RecordHeaders};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Observations shared between a test reader and the test.
#[derive(Debug, Default)]
pub struct ReaderProbe {
    committed: Mutex<Vec<Record>>,
    closed: AtomicBool,
    fetches: AtomicUsize,
}

impl ReaderProbe {
    /// Records committed so far, in commit order.
    #[must_use]
    pub fn committed(&self) -> Vec<Record> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Committed record values decoded as UTF-8 (lossy).
    #[must_use]
    pub fn committed_values(&self) -> Vec<String> {
        self.committed()
            .iter()
            .map(|r| String::from_utf8_lossy(&r.value).into_owned())
            .collect()
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Completed `fetch_message` calls, successful or not.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn record_commit(&self, records: &[Record]) {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
    }
}

/// Reader fed through a channel by a [`ChannelReaderHandle`].
///
/// `fetch_message` waits for the next record; once every handle has been
/// dropped or [`end`](ChannelReaderHandle::end) was called it returns
/// [`ReaderError::Closed`].
pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Record>,
    probe: Arc<ReaderProbe>,
}

impl ChannelReader {
    /// Reader plus the handle that feeds it.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> (Self, ChannelReaderHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = Arc::new(ReaderProbe::default());
        let handle = ChannelReaderHandle {
            topic: topic.into(),
            tx: Mutex::new(Some(tx)),
            next_offset: AtomicI64::new(0),
            probe: Arc::clone(&probe),
        };
        (Self { rx, probe }, handle)
    }
}

impl Reader for ChannelReader {
    fn fetch_message(&mut self) -> ReaderFuture<'_, Record> {
        Box::pin(async move {
            let next = self.rx.recv().await;
            self.probe.fetches.fetch_add(1, Ordering::SeqCst);
            next.ok_or(ReaderError::Closed)
        })
    }

    fn commit_messages<'a>(&'a mut self, records: &'a [Record]) -> ReaderFuture<'a, ()> {
        Box::pin(async move {
            self.probe.record_commit(records);
            Ok(())
        })
    }

    fn close(&mut self) -> ReaderFuture<'_, ()> {
        Box::pin(async move {
            self.rx.close();
            self.probe.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Test-side end of a [`ChannelReader`].
pub struct ChannelReaderHandle {
    topic: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Record>>>,
    next_offset: AtomicI64,
    probe: Arc<ReaderProbe>,
}

impl ChannelReaderHandle {
    /// Deliver `record` as is.
    pub fn send(&self, record: Record) {
        if let Some(tx) = self.tx.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            let _ = tx.send(record);
        }
    }

    /// Deliver a record with `value` and the next offset on partition 0.
    pub fn send_value(&self, value: impl Into<Vec<u8>>) {
        self.send_with_headers(value, RecordHeaders::new());
    }

    /// Deliver a record with `value`, `headers` and the next offset.
    pub fn send_with_headers(&self, value: impl Into<Vec<u8>>, headers: RecordHeaders) {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        self.send(Record::new(self.topic.clone(), 0, offset, value).with_headers(headers));
    }

    /// Signal end of stream; the reader returns `Closed` once drained.
    pub fn end(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Shared observations.
    #[must_use]
    pub fn probe(&self) -> Arc<ReaderProbe> {
        Arc::clone(&self.probe)
    }

    /// See [`ReaderProbe::committed_values`].
    #[must_use]
    pub fn committed_values(&self) -> Vec<String> {
        self.probe.committed_values()
    }

    /// See [`ReaderProbe::is_closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.probe.is_closed()
    }
}

/// One scripted fetch outcome.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this record
    Record(Record),
    /// Return this error
    Fail(ReaderError),
}

/// Reader that replays a fixed script of fetch outcomes.
///
/// Once the script is exhausted it either reports `Closed` or, with
/// [`then_pending`](Self::then_pending), blocks until cancelled.
pub struct ScriptedReader {
    steps: VecDeque<Step>,
    pend_when_done: bool,
    probe: Arc<ReaderProbe>,
}

impl ScriptedReader {
    /// Reader replaying `steps`.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = Step>) -> (Self, Arc<ReaderProbe>) {
        let probe = Arc::new(ReaderProbe::default());
        let reader = Self {
            steps: steps.into_iter().collect(),
            pend_when_done: false,
            probe: Arc::clone(&probe),
        };
        (reader, probe)
    }

    /// Block instead of closing once the script runs out.
    #[must_use]
    pub const fn then_pending(mut self) -> Self {
        self.pend_when_done = true;
        self
    }
}

impl Reader for ScriptedReader {
    fn fetch_message(&mut self) -> ReaderFuture<'_, Record> {
        Box::pin(async move {
            let step = self.steps.pop_front();
            if step.is_none() && self.pend_when_done {
                std::future::pending::<()>().await;
            }
            self.probe.fetches.fetch_add(1, Ordering::SeqCst);
            match step {
                Some(Step::Record(record)) => Ok(record),
                Some(Step::Fail(e)) => Err(e),
                None => Err(ReaderError::Closed),
            }
        })
    }

    fn commit_messages<'a>(&'a mut self, records: &'a [Record]) -> ReaderFuture<'a, ()> {
        Box::pin(async move {
            self.probe.record_commit(records);
            Ok(())
        })
    }

    fn close(&mut self) -> ReaderFuture<'_, ()> {
        Box::pin(async move {
            self.probe.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Factory handing out pre-built readers by topic.
#[derive(Default)]
pub struct StaticReaderFactory {
    readers: Mutex<HashMap<String, Box<dyn Reader>>>,
    created: AtomicUsize,
}

impl StaticReaderFactory {
    /// Empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`ChannelReader`] for `topic` and return its handle.
    pub fn channel(&self, topic: &str) -> ChannelReaderHandle {
        let (reader, handle) = ChannelReader::new(topic);
        self.insert(topic, Box::new(reader));
        handle
    }

    /// Serve `reader` for `topic`.
    pub fn insert(&self, topic: &str, reader: Box<dyn Reader>) {
        self.readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string(), reader);
    }

    /// Readers handed out so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ReaderFactory for StaticReaderFactory {
    fn create(&self, config: &ReaderConfig) -> Result<Box<dyn Reader>, ReaderError> {
        let reader = self
            .readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&config.topic)
            .ok_or_else(|| ReaderError::Config(format!("no test reader for topic '{}'", config.topic)))?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_reader_delivers_then_closes() {
        let (mut reader, handle) = ChannelReader::new("t");
        handle.send_value("a");
        handle.send_value("b");
        handle.end();

        let a = reader.fetch_message().await.unwrap();
        let b = reader.fetch_message().await.unwrap();
        assert_eq!((a.offset, b.offset), (0, 1));
        assert_eq!(reader.fetch_message().await, Err(ReaderError::Closed));

        reader.commit_messages(std::slice::from_ref(&a)).await.unwrap();
        reader.close().await.unwrap();
        assert_eq!(handle.committed_values(), vec!["a".to_string()]);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_scripted_reader_replays_errors() {
        let (mut reader, probe) = ScriptedReader::new([
            Step::Fail(ReaderError::Transport("down".into())),
            Step::Record(Record::new("t", 0, 0, "x")),
        ]);

        assert!(reader.fetch_message().await.unwrap_err().is_transient());
        assert_eq!(reader.fetch_message().await.unwrap().value, b"x".to_vec());
        assert_eq!(reader.fetch_message().await, Err(ReaderError::Closed));
        assert_eq!(probe.fetch_count(), 3);
    }

    #[test]
    fn test_factory_hands_out_each_reader_once() {
        let factory = StaticReaderFactory::new();
        let _handle = factory.channel("t");
        let config = ReaderConfig {
            brokers: vec![],
            topic: "t".into(),
            group_id: "g".into(),
            max_wait: std::time::Duration::from_millis(50),
            start_offset: atlas_core::reader::StartOffset::First,
        };

        assert!(factory.create(&config).is_ok());
        assert!(matches!(factory.create(&config), Err(ReaderError::Config(_))));
        assert_eq!(factory.created(), 1);
    }
}
