//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the diffing proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The two backends under comparison.
    pub backends: BackendsConfig,

    /// Optional comparator plugin.
    pub plugin: PluginConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", DEFAULT_PORT),
        }
    }
}

pub const DEFAULT_PORT: u16 = 8080;

/// Backend targets.
///
/// URLs are kept as given; a URL that does not parse is reported when a
/// request is forwarded to it, as a 502.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BackendsConfig {
    /// Base URL of the candidate backend (e.g., "http://127.0.0.1:8082").
    pub newer: String,

    /// Base URL of the trusted backend whose responses reach the caller.
    pub current: String,

    /// Per-call timeout in seconds. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl BackendsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Comparator plugin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Path to a plugin executable. Absent selects the built-in comparator.
    pub path: Option<PathBuf>,

    /// How long to wait for the plugin's handshake line.
    pub start_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            path: None,
            start_timeout_secs: 60,
        }
    }
}

impl PluginConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per record, for log collectors.
    Json,
    /// Human-readable output for local runs.
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus endpoint bind address. Metrics are off when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_address: None,
        }
    }
}
