//! Fleet node registry daemon.
//!
//! Runs the liveness side of the registry against a local SQLite store:
//!
//! - **State listener**: applies activation/disconnection signals
//! - **Synchronizer**: periodically probes every node and records the result

use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_registry::config::Config;
use fleet_registry::{
    EventBus, EventNotifier, LivenessProber, LocalBus, NodeRegistry, SqliteStore,
    StateChangeListener, StateSynchronizer, StoreRegistry,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FLEET_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fleet node registry");
    info!(
        db_path = %config.db_path.display(),
        sync_interval_secs = config.sync_interval.as_secs(),
        probe_timeout_ms = config.probe_timeout.as_millis() as u64,
        event_capacity = config.event_capacity,
        "Configuration loaded"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("Failed to open store: {}", config.db_path.display()))?;

    let bus: Arc<dyn EventBus> = Arc::new(LocalBus::new(config.event_capacity));
    let registry: Arc<dyn NodeRegistry> = Arc::new(EventNotifier::new(
        Arc::new(StoreRegistry::new(Arc::new(store))),
        Arc::clone(&bus),
    ));

    let node_count = registry.node_ids().await?.len();
    info!(node_count, "Registry opened");

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = StateChangeListener::spawn(Arc::clone(&registry), bus.as_ref());

    let synchronizer = StateSynchronizer::new(
        Arc::clone(&registry),
        LivenessProber::new(config.probe_timeout),
    );
    let sync_interval = config.sync_interval;
    let mut sync_handle = tokio::spawn(async move {
        synchronizer.run(sync_interval, shutdown_rx).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut sync_handle => {
            if let Err(e) = result {
                error!(error = %e, "Synchronizer task panicked");
            }
        }
    }

    // Signal shutdown to all workers
    let _ = shutdown_tx.send(true);
    listener.close().await;
    if !sync_handle.is_finished() {
        if let Err(e) = sync_handle.await {
            error!(error = %e, "Synchronizer task panicked");
        }
    }

    info!("Fleet node registry shutdown complete");
    Ok(())
}
