//! Applies externally published liveness signals to the registry.
//!
//! `NodeActivated` marks a node online and `NodeDisconnected` marks it
//! offline. Signals for unregistered nodes are dropped.

use std::sync::Arc;

use fleet_events::{EventEnvelope, EventKind, NodeEvent};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Subscription};
use crate::error::RegistryError;
use crate::node::NodeState;
use crate::registry::NodeRegistry;

/// Background subscriber for activation/disconnection signals.
pub struct StateChangeListener {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StateChangeListener {
    /// Subscribes to the bus and starts applying signals.
    ///
    /// The subscription is taken before this returns, so signals published
    /// afterwards are never missed.
    pub fn spawn(registry: Arc<dyn NodeRegistry>, bus: &dyn EventBus) -> Self {
        let subscription =
            bus.subscribe(&[EventKind::NodeActivated, EventKind::NodeDisconnected]);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listen(registry, subscription, shutdown_rx));

        info!("State change listener started");
        Self {
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Unsubscribes and waits for the listener task to finish.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);

        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        if let Err(e) = task.await {
            warn!(error = %e, "State change listener task failed");
        }
        info!("State change listener closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Drop for StateChangeListener {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn listen(
    registry: Arc<dyn NodeRegistry>,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            envelope = subscription.recv() => match envelope {
                Some(envelope) => apply(registry.as_ref(), &envelope).await,
                None => {
                    debug!("Event bus closed, listener stopping");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    // Dropping the subscription here unsubscribes.
}

async fn apply(registry: &dyn NodeRegistry, envelope: &EventEnvelope) {
    let (node_id, state) = match &envelope.payload {
        NodeEvent::NodeActivated { node_id } => (node_id, NodeState::Online),
        NodeEvent::NodeDisconnected { node_id } => (node_id, NodeState::Offline),
        other => {
            debug!(event_type = other.event_type(), "Ignoring event");
            return;
        }
    };

    match registry.set_node_state(node_id, state).await {
        Ok(()) => debug!(
            event_id = %envelope.event_id,
            node_id = %node_id,
            state = %state,
            "Liveness signal applied"
        ),
        Err(RegistryError::UnknownNode(_)) => warn!(
            node_id = %node_id,
            event_type = %envelope.event_type,
            "Liveness signal for unregistered node ignored"
        ),
        Err(e) => warn!(
            node_id = %node_id,
            error = %e,
            "Failed to apply liveness signal"
        ),
    }
}
