//! Liveness probing.
//!
//! A probe is a TCP connect to the node's SSH port (or a given port) under a
//! short timeout. Unreachability is an expected outcome and is reported as
//! `false`; only unexpected I/O failures are errors.
//!
//! `probe_many` fans out one task per node in a `JoinSet` that lives only
//! for the duration of the call, so a batch takes roughly one probe timeout
//! regardless of fleet size.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use fleet_id::NodeId;
use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::debug;

use crate::node::NodeInfo;

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Probe failures other than "node unreachable".
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe of {host}:{port} failed: {source}")]
    Io {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("probe task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Returns true for errors that mean "could not connect".
fn is_connection_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown
    )
}

/// Bounded-timeout reachability checker.
#[derive(Debug, Clone)]
pub struct LivenessProber {
    timeout: Duration,
}

impl Default for LivenessProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl LivenessProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes the node's SSH port.
    pub async fn probe(&self, node: &NodeInfo) -> Result<bool, ProbeError> {
        self.probe_port(node, node.ssh_port).await
    }

    /// Probes `port` on the node's host.
    pub async fn probe_port(&self, node: &NodeInfo, port: u16) -> Result<bool, ProbeError> {
        let host = node.host.as_str();

        match timeout(self.timeout, connect(host, port)).await {
            Ok(Ok(reachable)) => {
                debug!(node_id = %node.node_id, host, port, reachable, "Probe finished");
                Ok(reachable)
            }
            Ok(Err(source)) => Err(ProbeError::Io {
                host: host.to_string(),
                port,
                source,
            }),
            Err(_) => {
                debug!(node_id = %node.node_id, host, port, "Probe timed out");
                Ok(false)
            }
        }
    }

    /// Probes every node concurrently.
    pub async fn probe_many(&self, nodes: &[NodeInfo]) -> Result<HashMap<NodeId, bool>, ProbeError> {
        if nodes.is_empty() {
            return Ok(HashMap::new());
        }

        let mut tasks = JoinSet::new();
        for node in nodes {
            let prober = self.clone();
            let node = node.clone();
            tasks.spawn(async move {
                let reachable = prober.probe(&node).await;
                (node.node_id, reachable)
            });
        }

        // An early return drops the set, aborting the remaining probes.
        let mut results = HashMap::with_capacity(nodes.len());
        while let Some(joined) = tasks.join_next().await {
            let (node_id, reachable) = joined?;
            results.insert(node_id, reachable?);
        }

        debug!(
            probed = results.len(),
            reachable = results.values().filter(|up| **up).count(),
            "Probe batch finished"
        );
        Ok(results)
    }
}

/// Resolves `host` and tries each address until one accepts.
///
/// Resolution failures and connection-level errors yield `Ok(false)`.
async fn connect(host: &str, port: u16) -> io::Result<bool> {
    let addrs: Vec<SocketAddr> = match lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!(host, error = %e, "Name resolution failed");
            return Ok(false);
        }
    };

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(_stream) => return Ok(true),
            Err(e) => last_err = Some(e),
        }
    }

    match last_err {
        Some(e) if !is_connection_failure(&e) => Err(e),
        Some(e) => {
            debug!(host, port, error = %e, "Connection failed");
            Ok(false)
        }
        None => Ok(false),
    }
}
