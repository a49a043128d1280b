//! Configuration for quizcache
//!
//! The surface is deliberately small: the sweep interval, the local/distributed
//! store switch, the topic prefix namespacing distributed stores, and the
//! finalization retry knobs. Everything else is wiring.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interval between periodic cache sweeps, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Back caches with the distributed store instead of local maps
    #[serde(default)]
    pub distributed: bool,

    /// Logical prefix namespacing the distributed store topics per exercise
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Per-participant persistence attempts during finalization
    #[serde(default = "default_finalize_max_retries")]
    pub finalize_max_retries: usize,

    /// Initial backoff delay between persistence attempts, in milliseconds
    #[serde(default = "default_finalize_retry_delay_ms")]
    pub finalize_retry_delay_ms: u64,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_sweep_interval_ms() -> u64 {
    3000
}
fn default_topic_prefix() -> String {
    "quiz".to_string()
}
fn default_finalize_max_retries() -> usize {
    3
}
fn default_finalize_retry_delay_ms() -> u64 {
    250
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            distributed: false,
            topic_prefix: default_topic_prefix(),
            finalize_max_retries: default_finalize_max_retries(),
            finalize_retry_delay_ms: default_finalize_retry_delay_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus `QUIZCACHE_*`
    /// environment overrides.
    pub fn load(path: Option<&str>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("QUIZCACHE"))
            .build()
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn finalize_retry_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_retry_delay_ms)
    }
}
