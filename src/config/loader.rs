//! Configuration loader with file resolution and environment overrides.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SENSOR_BRIDGE";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for an explicit config path
const CONFIG_PATH_ENV: &str = "SENSOR_BRIDGE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using the standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SENSOR_BRIDGE_CONFIG` environment variable (explicit path)
    /// 2. `./config.toml` (current directory)
    /// 3. The platform config directory (XDG on Linux/macOS, APPDATA on
    ///    Windows)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override values from any of these.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Env overrides still apply on top of defaults.
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using the standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(dirs) = ProjectDirs::from("", "", "sensor-bridge") {
        let app_config = dirs.config_dir().join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Apply environment variable overrides, pattern
/// `SENSOR_BRIDGE_<SECTION>_<KEY>`:
/// - `SENSOR_BRIDGE_SERVER_PORT=8080`
/// - `SENSOR_BRIDGE_SERIAL_PORT=/dev/ttyACM1`
/// - `SENSOR_BRIDGE_STORAGE_DATABASE_URL=` (empty disables persistence)
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERVER_HOST")) {
        config.server.host = val;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERVER_PORT")) {
        config.server.port = val.parse().map_err(|_| {
            ConfigError::env_parse(format!("{ENV_PREFIX}_SERVER_PORT"), "invalid port number")
        })?;
    }

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_PORT")) {
        config.serial.port = if val.is_empty() { None } else { Some(val) };
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_BAUD_RATE")) {
        config.serial.baud_rate = val.parse().map_err(|_| {
            ConfigError::env_parse(format!("{ENV_PREFIX}_SERIAL_BAUD_RATE"), "invalid baud rate")
        })?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_RECONNECT_ENABLED")) {
        config.serial.reconnect.enabled = val.eq_ignore_ascii_case("true") || val == "1";
    }

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_HUB_PUSH_INTERVAL_MS")) {
        config.hub.push_interval_ms = val.parse().map_err(|_| {
            ConfigError::env_parse(
                format!("{ENV_PREFIX}_HUB_PUSH_INTERVAL_MS"),
                "invalid interval",
            )
        })?;
    }

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_STORAGE_DATABASE_URL")) {
        config.storage.database_url = if val.is_empty() { None } else { Some(val) };
    }

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }

    Ok(())
}
