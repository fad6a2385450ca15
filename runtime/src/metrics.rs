//! Prometheus metrics for the consumer runtime and the emit path.
//!
//! # Example
//!
//! ```rust,no_run
//! use atlas_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Scrape http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Exporter could not be built or its listener could not bind
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus exporter serving `/metrics` over HTTP.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Server that will listen on `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime. A second call in the same
    /// process (tests) logs a warning and leaves the first recorder in place.
    ///
    /// # Errors
    ///
    /// [`MetricsError::Build`] if the exporter cannot be built or bound.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });
        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started");
        Ok(())
    }

    /// Handle to the installed recorder, if this server installed it.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "consumer_records_fetched_total",
        "Records fetched by consumer loops"
    );
    describe_counter!(
        "consumer_records_committed_total",
        "Records whose offset was committed after every handler succeeded"
    );
    describe_counter!(
        "consumer_records_withheld_total",
        "Records left uncommitted because a handler failed or panicked"
    );
    describe_counter!(
        "consumer_handler_failures_total",
        "Handler invocations that returned an error"
    );
    describe_counter!(
        "consumer_handler_panics_total",
        "Handler invocations that panicked"
    );
    describe_counter!(
        "consumer_fetch_retries_total",
        "Fetch attempts retried after a transient reader error"
    );
    describe_histogram!(
        "consumer_dispatch_duration_seconds",
        "Time from fetch to commit decision for one record"
    );

    describe_counter!("emit_messages_sent_total", "Messages published by emit");
    describe_counter!("emit_failures_total", "Buffered batches that failed to publish");

    describe_counter!("retry_attempts_total", "Retries scheduled");
    describe_counter!("retry_successes_total", "Operations that succeeded after retrying");
    describe_counter!("retry_exhausted_total", "Operations that exhausted their retries");
}

/// Consumer loop metrics, labelled by topic.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// A record was fetched.
    pub fn record_fetch(topic: &str) {
        counter!("consumer_records_fetched_total", "topic" => topic.to_string()).increment(1);
    }

    /// A record was dispatched and its commit decision taken.
    pub fn record_dispatch(topic: &str, committed: bool, duration: Duration) {
        if committed {
            counter!("consumer_records_committed_total", "topic" => topic.to_string()).increment(1);
        } else {
            counter!("consumer_records_withheld_total", "topic" => topic.to_string()).increment(1);
        }
        histogram!("consumer_dispatch_duration_seconds", "topic" => topic.to_string())
            .record(duration.as_secs_f64());
    }

    /// A handler returned an error.
    pub fn record_handler_failure(topic: &str) {
        counter!("consumer_handler_failures_total", "topic" => topic.to_string()).increment(1);
    }

    /// A handler panicked.
    pub fn record_handler_panic(topic: &str) {
        counter!("consumer_handler_panics_total", "topic" => topic.to_string()).increment(1);
    }

    /// A fetch is being retried.
    pub fn record_fetch_retry(topic: &str) {
        counter!("consumer_fetch_retries_total", "topic" => topic.to_string()).increment(1);
    }
}

/// Retry helper metrics.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
