use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::order_actor::OrderPolicy;

/// Env var naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "ORDER_SYNC_CONFIG";
/// Env var overriding `data_dir`.
pub const DATA_DIR_ENV: &str = "ORDER_SYNC_DATA_DIR";

/// Runtime settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Mailbox size of the order service and the countdown ticker.
    pub mailbox_size: usize,
    /// Broadcast channel capacity of the status-change bus.
    pub bus_capacity: usize,
    /// Envelopes kept for replay to lagging subscribers.
    pub replay_capacity: usize,
    pub penalty_window_secs: u64,
    pub stale_pending_secs: u64,
    pub cancellation_penalty: f64,
    pub countdown_tick_ms: u64,
    pub sweep_interval_secs: u64,
    pub simulated_latency_ms: u64,
    /// Snapshot directory. `None` keeps the snapshot in memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mailbox_size: 32,
            bus_capacity: 64,
            replay_capacity: 256,
            penalty_window_secs: 600,
            stale_pending_secs: 3600,
            cancellation_penalty: 5.0,
            countdown_tick_ms: 1000,
            sweep_interval_secs: 60,
            simulated_latency_ms: 0,
            data_dir: None,
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Defaults, overlaid by the file named in `ORDER_SYNC_CONFIG` and then
    /// by `ORDER_SYNC_DATA_DIR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => {
                info!(path = ?path, "Loading config file");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("mailbox_size", self.mailbox_size as u64),
            ("bus_capacity", self.bus_capacity as u64),
            ("penalty_window_secs", self.penalty_window_secs),
            ("stale_pending_secs", self.stale_pending_secs),
            ("countdown_tick_ms", self.countdown_tick_ms),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if !self.cancellation_penalty.is_finite() || self.cancellation_penalty < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cancellation_penalty must be a non-negative amount, got {}",
                self.cancellation_penalty
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> OrderPolicy {
        OrderPolicy {
            penalty_window: Duration::from_secs(self.penalty_window_secs),
            stale_after: Duration::from_secs(self.stale_pending_secs),
            cancellation_penalty: self.cancellation_penalty,
        }
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}
