//! eventsync-worker: registry synchronization worker
//!
//! Binds a private, auto-deleted queue to the resource event exchange and
//! keeps the in-memory phrase and snippet registries in sync with the store.
//!
//! ## Configuration
//! - EVENTSYNC_CONFIG: Path to a YAML config file (optional)
//! - EVENTSYNC__AMQP__HOST / __PORT / __USERNAME / __PASSWORD: broker location
//! - EVENTSYNC__RESOURCES__BASE_URL: resource store for loading content
//! - EVENTSYNC_LOG: tracing filter (default: info)
//!
//! Exits non-zero if the worker queue cannot be set up.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use eventsync::config::Config;
use eventsync::registry::{HttpResourceSource, InMemoryIndex, InMemoryRegistry};
use eventsync::sync::RegistrySync;
use eventsync::utils::bootstrap::{init_tracing, interrupt};
use eventsync::worker::{AmqpBroker, Worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let source = Arc::new(HttpResourceSource::new(&config.resources)?);
    let sync = Arc::new(RegistrySync::new(
        source,
        Arc::new(InMemoryRegistry::new()),
        Arc::new(InMemoryIndex::new()),
    ));
    let broker = Arc::new(AmqpBroker::new(&config.amqp));
    let worker = Worker::new(&config, broker, sync);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            interrupt().await;
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    worker.run(shutdown).await?;

    info!(worker_id = %worker.identity(), "Worker stopped");
    Ok(())
}
