//! ShopGuard runtime configuration schema.
//!
//! Every section is optional in the YAML file; missing keys take the values
//! from the `Default` impls below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use shopguard_core::{FailureMode, RateLimitPolicy};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopGuardConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sweep: SweepConfig,
    pub logging: LoggingConfig,
    /// Policies keyed by action key (e.g. `sign-in/email`).
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl ShopGuardConfig {
    /// Policy and failure mode declared for `action_key`.
    pub fn policy(&self, action_key: &str) -> Option<(RateLimitPolicy, FailureMode)> {
        self.policies.get(action_key).map(|p| {
            (
                RateLimitPolicy::new(action_key, p.window_seconds, p.max_count),
                p.failure_mode,
            )
        })
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.sweep.retention_hours.saturating_mul(3600))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

/// HTTP API listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8088,
        }
    }
}

/// Counter store location and lock-wait bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path.
    pub path: String,
    /// How long a transaction may wait for the write lock.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "shopguard.db".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Retention sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Counters older than this are deleted by a sweep.
    pub retention_hours: u64,
    /// Bearer secret for the HTTP sweep trigger. `None` disables the trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_secret: Option<String>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            trigger_secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for the rolling JSON log file; console only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// JSON lines on the console instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}

/// One entry of the policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub window_seconds: u64,
    pub max_count: u32,
    #[serde(default)]
    pub failure_mode: FailureMode,
}

impl PolicyConfig {
    pub fn new(window_seconds: u64, max_count: u32) -> Self {
        Self {
            window_seconds,
            max_count,
            failure_mode: FailureMode::Closed,
        }
    }
}
