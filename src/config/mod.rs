//! Configuration module.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Resolution
//!
//! 1. `SENSOR_BRIDGE_CONFIG` environment variable (explicit path)
//! 2. `./config.toml` (current directory)
//! 3. The platform config directory
//! 4. Built-in defaults (no file required)
//!
//! Any value can then be overridden with `SENSOR_BRIDGE_<SECTION>_<KEY>`
//! environment variables, e.g. `SENSOR_BRIDGE_SERVER_PORT=8080` or
//! `SENSOR_BRIDGE_SERIAL_PORT=/dev/ttyACM1`.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{
    Config, HubConfig, LogFormat, LoggingConfig, ReconnectConfig, SerialConfig, ServerConfig,
    StorageConfig,
};
