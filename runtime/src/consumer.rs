//! One consumer: a fetch loop over a single topic.
//!
//! ```text
//!   fetch (retry transient) ──► parse headers ──► start span
//!        ▲                                           │
//!        │                                 snapshot handler registry
//!        │                                           │
//!        │                              spawn one task per handler
//!        │                                           │
//!        │                                    join all tasks
//!        │                                           │
//!        │                    commit iff every task returned Ok (no panic)
//!        │                                           │
//!        └──────────── remove handlers that returned Disposition::Remove
//! ```
//!
//! Each record is fully drained before the next fetch, so per-partition
//! order is preserved and an offset is never committed ahead of an earlier
//! one. Cancellation only interrupts the fetch; a record already dispatched
//! runs to completion before the consumer drains.

use crate::metrics::ConsumerMetrics;
use crate::retry::RetryPolicy;
use atlas_core::context::OperationContext;
use atlas_core::handler::{Disposition, Handler, HandlerError, HandlerId};
use atlas_core::propagation::{HeaderParser, apply_parsers};
use atlas_core::reader::{Reader, ReaderError};
use atlas_core::record::Record;
use futures::future::join_all;
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, Tracer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Instrumentation scope of the per-record span.
const TRACER_NAME: &str = "atlas-kafka";

/// Lifecycle of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsumerState {
    /// Registered, loop not yet running
    Created,
    /// Fetching and dispatching
    Running,
    /// Loop exited; closing the reader
    Draining,
    /// Reader closed, no handler task outstanding
    Terminated,
}

/// Decrements an in-flight counter on drop, including on panic.
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl AtomicCounterGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A running consumer and its handler registry.
pub(crate) struct Consumer {
    name: String,
    topic: String,
    parsers: Vec<HeaderParser>,
    handlers: Mutex<HashMap<HandlerId, Arc<dyn Handler>>>,
    state: watch::Sender<ConsumerState>,
    in_flight: Arc<AtomicUsize>,
    token: CancellationToken,
    retry: RetryPolicy,
}

impl Consumer {
    pub(crate) fn new(
        name: String,
        topic: String,
        parsers: Vec<HeaderParser>,
        token: CancellationToken,
        retry: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Created);
        Self {
            name,
            topic,
            parsers,
            handlers: Mutex::new(HashMap::new()),
            state,
            in_flight: Arc::new(AtomicUsize::new(0)),
            token,
            retry,
        }
    }

    pub(crate) fn register(&self, handler: Arc<dyn Handler>) -> HandlerId {
        let id = HandlerId::new();
        self.registry().insert(id, handler);
        id
    }

    pub(crate) fn unregister(&self, id: HandlerId) -> bool {
        self.registry().remove(&id).is_some()
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.registry().len()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Wait until the consumer has reached `target` or a later state.
    pub(crate) async fn wait_for_state(&self, target: ConsumerState) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state >= target).await;
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<HandlerId, Arc<dyn Handler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
        tracing::debug!(consumer = %self.name, topic = %self.topic, state = ?state, "Consumer state changed");
    }

    /// Fetch loop. Returns once the consumer is terminated.
    pub(crate) async fn run(self: Arc<Self>, mut reader: Box<dyn Reader>) {
        self.set_state(ConsumerState::Running);
        tracing::info!(consumer = %self.name, topic = %self.topic, "Consumer started");

        loop {
            let fetched = tokio::select! {
                biased;
                () = self.token.cancelled() => {
                    tracing::info!(consumer = %self.name, topic = %self.topic, "Consumer cancelled");
                    break;
                }
                fetched = self.fetch(reader.as_mut()) => fetched,
            };

            match fetched {
                Ok(record) => self.dispatch(reader.as_mut(), Arc::new(record)).await,
                Err(ReaderError::Closed) => {
                    tracing::info!(consumer = %self.name, topic = %self.topic, "Reader closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        consumer = %self.name,
                        topic = %self.topic,
                        error = %e,
                        "Unable to fetch message, consumer exiting"
                    );
                    break;
                }
            }
        }

        self.set_state(ConsumerState::Draining);
        if let Err(e) = reader.close().await {
            tracing::warn!(consumer = %self.name, topic = %self.topic, error = %e, "Error closing reader");
        }
        self.set_state(ConsumerState::Terminated);
        tracing::info!(consumer = %self.name, topic = %self.topic, "Consumer terminated");
    }

    async fn fetch(&self, reader: &mut dyn Reader) -> Result<Record, ReaderError> {
        let mut attempt = 0;
        loop {
            match reader.fetch_message().await {
                Ok(record) => {
                    ConsumerMetrics::record_fetch(&self.topic);
                    return Ok(record);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        consumer = %self.name,
                        topic = %self.topic,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    ConsumerMetrics::record_fetch_retry(&self.topic);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch(&self, reader: &mut dyn Reader, record: Arc<Record>) {
        let started = Instant::now();

        let ctx = apply_parsers(
            &self.parsers,
            OperationContext::with_cancellation(self.token.clone()),
            &record.headers,
        );
        let otel_span = global::tracer(TRACER_NAME).start_with_context(self.name.clone(), ctx.trace());
        let ctx = ctx.with_span(otel_span);

        let span_context = ctx.span_context();
        let span = tracing::info_span!(
            "consume",
            consumer = %self.name,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            trace.id = %span_context.trace_id(),
            span.id = %span_context.span_id(),
        );
        span.set_parent(ctx.trace().clone());

        let snapshot: Vec<(HandlerId, Arc<dyn Handler>)> = self
            .registry()
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();

        let tasks = snapshot.into_iter().map(|(id, handler)| {
            let guard = AtomicCounterGuard::acquire(&self.in_flight);
            let ctx = ctx.clone();
            let record = Arc::clone(&record);
            let task = tokio::spawn(
                async move {
                    let _guard = guard;
                    handler.handle(ctx, record).await
                }
                .instrument(span.clone()),
            );
            async move { (id, task.await) }
        });
        let outcomes = join_all(tasks).await;

        let mut succeeded = true;
        let mut finished = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Ok(Disposition::Keep)) => {}
                Ok(Ok(Disposition::Remove)) => finished.push(id),
                Ok(Err(e)) => {
                    succeeded = false;
                    self.log_failure(id, &record, &e);
                }
                Err(join_error) => {
                    succeeded = false;
                    let reason = if join_error.is_panic() { "panicked" } else { "was cancelled" };
                    self.log_failure(id, &record, &HandlerError::Panicked(reason.to_string()));
                }
            }
        }

        let committed = succeeded && self.commit(reader, &record).instrument(span).await;
        if !succeeded {
            tracing::debug!(consumer = %self.name, offset = record.offset, "Offset withheld; record will be re-delivered");
        }

        if !finished.is_empty() {
            let mut registry = self.registry();
            for id in &finished {
                registry.remove(id);
                tracing::debug!(consumer = %self.name, handler_id = %id, "Handler finished, removed");
            }
        }

        ConsumerMetrics::record_dispatch(&self.topic, committed, started.elapsed());
        ctx.trace().span().end();
    }

    async fn commit(&self, reader: &mut dyn Reader, record: &Record) -> bool {
        match reader.commit_messages(std::slice::from_ref(record)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    consumer = %self.name,
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Unable to commit offset"
                );
                false
            }
        }
    }

    fn log_failure(&self, id: HandlerId, record: &Record, error: &HandlerError) {
        if matches!(error, HandlerError::Panicked(_)) {
            tracing::error!(
                consumer = %self.name,
                handler_id = %id,
                offset = record.offset,
                error = %error,
                "Handler task did not complete"
            );
            ConsumerMetrics::record_handler_panic(&self.topic);
        } else {
            tracing::warn!(
                consumer = %self.name,
                handler_id = %id,
                offset = record.offset,
                error = %error,
                "Handler failed"
            );
            ConsumerMetrics::record_handler_failure(&self.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_ordered() {
        assert!(ConsumerState::Created < ConsumerState::Running);
        assert!(ConsumerState::Running < ConsumerState::Draining);
        assert!(ConsumerState::Draining < ConsumerState::Terminated);
    }

    #[test]
    fn test_counter_guard_decrements_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = AtomicCounterGuard::acquire(&counter);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        drop(guard);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registry_register_and_unregister() {
        let consumer = Consumer::new(
            "c".into(),
            "t".into(),
            Vec::new(),
            CancellationToken::new(),
            RetryPolicy::default(),
        );
        let id = consumer.register(Arc::new(|_ctx: OperationContext, _r: Arc<Record>| async {
            Ok::<_, HandlerError>(Disposition::Keep)
        }));

        assert_eq!(consumer.handler_count(), 1);
        assert!(consumer.unregister(id));
        assert!(!consumer.unregister(id));
        assert_eq!(consumer.handler_count(), 0);
        assert_eq!(consumer.state(), ConsumerState::Created);
    }
}
