//! Reconciles recorded liveness with fresh probe results.
//!
//! Recorded state can drift when activation/disconnection signals are
//! missed (an agent that crashed never says goodbye). Each pass re-derives
//! every node's state from a probe, so passes are idempotent and
//! concurrent passes may race with last writer winning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::error::RegistryResult;
use crate::node::NodeState;
use crate::prober::LivenessProber;
use crate::registry::NodeRegistry;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub online: usize,
    pub offline: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.online + self.offline
    }
}

/// Probes every registered node and records the result.
pub struct StateSynchronizer {
    registry: Arc<dyn NodeRegistry>,
    prober: LivenessProber,
}

impl StateSynchronizer {
    pub fn new(registry: Arc<dyn NodeRegistry>, prober: LivenessProber) -> Self {
        Self { registry, prober }
    }

    /// Runs one reconciliation pass.
    ///
    /// The in-flight probe batch always runs to completion, bounded by the
    /// per-probe timeout. Store errors abort the pass and propagate.
    #[instrument(skip(self), name = "synchronize")]
    pub async fn synchronize(&self) -> RegistryResult<SyncReport> {
        let nodes = self.registry.get_nodes().await?;
        if nodes.is_empty() {
            debug!("No nodes registered, nothing to synchronize");
            return Ok(SyncReport::default());
        }

        let results = self.prober.probe_many(&nodes).await?;

        let mut report = SyncReport::default();
        let states: HashMap<_, _> = results
            .into_iter()
            .map(|(node_id, reachable)| {
                let state = NodeState::from_reachable(reachable);
                match state {
                    NodeState::Online => report.online += 1,
                    NodeState::Offline => report.offline += 1,
                }
                (node_id, state)
            })
            .collect();

        self.registry.set_node_states(states).await?;

        debug!(
            online = report.online,
            offline = report.offline,
            "Node states synchronized"
        );
        Ok(report)
    }

    /// Runs reconciliation every `interval` until shutdown.
    ///
    /// A failed pass is logged and the next tick retries from scratch.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            probe_timeout_ms = self.prober.timeout().as_millis() as u64,
            "Starting state synchronization loop"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.synchronize().await {
                        Ok(report) if report.total() > 0 => info!(
                            nodes = report.total(),
                            online = report.online,
                            "Synchronization pass complete"
                        ),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "State synchronization failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("State synchronizer shutting down");
                        break;
                    }
                }
            }
        }
    }
}
