//! Logging and distributed tracing bootstrap.
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     atlas_runtime::telemetry::init("atlas-wallet")?;
//!     // ... run the service
//!     atlas_runtime::telemetry::shutdown();
//!     Ok(())
//! }
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{TracerProvider, config};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Errors raised while installing telemetry.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Install the W3C propagator, an SDK tracer provider named after
/// `service_name`, and a `tracing` subscriber bridged to it.
///
/// The log filter comes from `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// [`TelemetryError::Subscriber`] if a global subscriber is already set.
pub fn init(service_name: &str) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let provider = TracerProvider::builder()
        .with_config(config().with_resource(Resource::new([KeyValue::new(
            "service.name",
            service_name.to_string(),
        )])))
        .build();
    let tracer = provider.tracer(service_name.to_string());
    global::set_tracer_provider(provider);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    Registry::default()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(fmt::layer())
        .try_init()?;

    tracing::info!(service = service_name, "Telemetry initialized");
    Ok(())
}

/// Flush and uninstall the global tracer provider.
pub fn shutdown() {
    global::shutdown_tracer_provider();
}
