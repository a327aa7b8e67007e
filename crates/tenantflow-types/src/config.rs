//! Engine configuration types.
//!
//! `EngineConfig` represents the top-level `config.toml` in the data
//! directory. All fields have sensible defaults.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Width of the idempotency time bucket for trigger events. 0 disables
    /// deduplication.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Optimistic retries for a publish that loses a race.
    #[serde(default = "default_publish_max_attempts")]
    pub publish_max_attempts: u32,

    /// Upper bound on steps driven by one `run_until_blocked` call.
    #[serde(default = "default_max_steps_per_run")]
    pub max_steps_per_run: u32,

    /// Idle time after which a non-terminal execution is swept as timed out.
    #[serde(default = "default_stale_execution_secs")]
    pub stale_execution_secs: u64,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_dedup_window_secs() -> u64 {
    300
}

fn default_publish_max_attempts() -> u32 {
    3
}

fn default_max_steps_per_run() -> u32 {
    1000
}

fn default_stale_execution_secs() -> u64 {
    86_400
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            publish_max_attempts: default_publish_max_attempts(),
            max_steps_per_run: default_max_steps_per_run(),
            stale_execution_secs: default_stale_execution_secs(),
            server: ServerConfig::default(),
        }
    }
}

/// HTTP listener settings for `tflow serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
