//! Configuration schema definitions.
//!
//! All sections are serde structs with defaults, so a missing file or a
//! partial file both produce a runnable configuration.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP/WebSocket server settings
    pub server: ServerConfig,
    /// Serial link settings
    pub serial: SerialConfig,
    /// Viewer session settings
    pub hub: HubConfig,
    /// Persistence settings
    pub storage: StorageConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port number for the HTTP server
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
        }
    }
}

/// Serial link configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path. When unset, the locator heuristics pick one.
    pub port: Option<String>,
    /// Baud rate for the device link
    pub baud_rate: u32,
    /// How often the reader polls the port, in milliseconds
    pub read_interval_ms: u64,
    /// Auto-reconnect policy
    pub reconnect: ReconnectConfig,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_interval_ms: 50,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Auto-reconnect policy.
///
/// A failed locate retries slower than a runtime fault; the split is kept
/// from the original deployment as a tunable, not a load-bearing value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Whether the link reopens itself after device loss
    pub enabled: bool,
    /// Delay before retrying after a device-side error or close, in ms
    pub error_delay_ms: u64,
    /// Delay before retrying after a failed locate, in ms
    pub locate_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_delay_ms: 3000,
            locate_delay_ms: 5000,
        }
    }
}

/// Viewer session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Interval between telemetry pushes to each viewer, in milliseconds
    pub push_interval_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            push_interval_ms: 1000,
        }
    }
}

/// Persistence configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL for the sample store; unset disables persistence
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: Some("sqlite://sensor-bridge.db?mode=rwc".to_owned()),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty format with colors
    Pretty,
    /// Compact single-line format
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}
