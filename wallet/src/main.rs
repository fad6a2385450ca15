//! Wallet service binary.
//!
//! Environment:
//! - `BOOTSTRAP_SERVERS`: comma-separated Kafka brokers
//! - `EVENT_TOPIC_ACCOUNT_STATUS`, `COMMAND_TOPIC_WALLET`,
//!   `EVENT_TOPIC_WALLET_STATUS`: concrete topic names
//! - `DATABASE_URL`: `PostgreSQL` connection string
//! - `METRICS_ADDR`: Prometheus listener (default `0.0.0.0:9100`)
//! - `RUST_LOG`: log filter (default `info`)

use anyhow::Context as _;
use atlas_core::topic::TopicResolver;
use atlas_kafka::{KafkaProducer, KafkaReaderFactory};
use atlas_postgres::Database;
use atlas_runtime::metrics::MetricsServer;
use atlas_runtime::retry::retry_with_backoff;
use atlas_runtime::{ConsumerManager, RetryPolicy, config, global, telemetry};
use atlas_wallet::{PostgresWalletRepository, WalletService, consumers};
use std::net::SocketAddr;
use std::sync::Arc;

const SERVICE_NAME: &str = "atlas-wallet";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9100";
const MAX_DB_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init(SERVICE_NAME)?;
    tracing::info!(service = SERVICE_NAME, "Starting");

    let metrics_addr: SocketAddr = std::env::var("METRICS_ADDR")
        .unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string())
        .parse()
        .context("METRICS_ADDR is not a socket address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start()?;

    let resolver = TopicResolver::from_env();
    let brokers = config::brokers(&resolver)?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let db = retry_with_backoff(RetryPolicy::default(), || {
        Database::connect(&database_url, MAX_DB_CONNECTIONS)
    })
    .await?;
    let repository = PostgresWalletRepository::new(db);
    repository.bootstrap().await?;

    let producer = KafkaProducer::builder().brokers(brokers).build()?;
    let service = Arc::new(WalletService::new(
        Arc::new(repository),
        Arc::new(producer),
        resolver.clone(),
    )?);

    let manager = global::install(ConsumerManager::new(Arc::new(KafkaReaderFactory::new())));
    consumers::register(&manager, &resolver, &service)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    manager.shutdown().await;
    telemetry::shutdown();
    Ok(())
}
