//! Configuration for the registry daemon.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::bus::DEFAULT_BUS_CAPACITY;

/// Registry daemon configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the SQLite store.
    pub db_path: PathBuf,

    /// Interval between reconciliation passes.
    pub sync_interval: Duration,

    /// Per-probe connect timeout.
    pub probe_timeout: Duration,

    /// Envelopes buffered per bus subscriber.
    pub event_capacity: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("FLEET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/var/lib/fleet/registry.db"));

        let sync_interval_secs: u64 = lookup("FLEET_SYNC_INTERVAL_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("FLEET_SYNC_INTERVAL_SECS must be an integer (seconds).")?
            .unwrap_or(30);
        let sync_interval = Duration::from_secs(sync_interval_secs.max(1));

        let probe_timeout_ms: u64 = lookup("FLEET_PROBE_TIMEOUT_MS")
            .map(|v| v.parse())
            .transpose()
            .context("FLEET_PROBE_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(500)
            .clamp(50, 5000);
        let probe_timeout = Duration::from_millis(probe_timeout_ms);

        let event_capacity: usize = lookup("FLEET_EVENT_CAPACITY")
            .map(|v| v.parse())
            .transpose()
            .context("FLEET_EVENT_CAPACITY must be a positive integer.")?
            .unwrap_or(DEFAULT_BUS_CAPACITY)
            .max(1);

        let log_level = lookup("FLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            db_path,
            sync_interval,
            probe_timeout,
            event_capacity,
            log_level,
        })
    }
}
