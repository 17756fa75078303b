//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "USB_SERIAL_BRIDGE";

/// Config file name
const CONFIG_FILE_NAME: &str = "usb-serial-bridge.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "USB_SERIAL_BRIDGE_CONFIG";

/// Application name used for the platform config directory
const APP_NAME: &str = "usb-serial-bridge";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `USB_SERIAL_BRIDGE_CONFIG` environment variable (explicit path)
    /// 2. `./usb-serial-bridge.toml` (current directory)
    /// 3. `usb-serial-bridge.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values, and the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    ///
    /// Unlike [`load`](Self::load), a missing file is an error here.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides still apply. An unparsable variable is logged
    /// and skipped; the others are kept. If the result fails validation the
    /// built-in defaults are used instead.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        for err in collect_env_overrides(&mut config) {
            warn!("Ignoring environment override: {}", err);
        }
        if let Err(err) = config.validate() {
            warn!("Environment overrides rejected, using defaults: {}", err);
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Parse `USB_SERIAL_BRIDGE_<suffix>` into `target` when it is set.
fn override_from_env<T: FromStr>(suffix: &str, target: &mut T, what: &str) -> ConfigResult<()> {
    let var = format!("{}_{}", ENV_PREFIX, suffix);
    if let Ok(val) = std::env::var(&var) {
        *target = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}")))?;
    }
    Ok(())
}

/// Apply environment variable overrides to the configuration, failing on
/// the first variable that does not parse.
///
/// Environment variables follow the pattern: `USB_SERIAL_BRIDGE_<SECTION>_<KEY>`
/// For example:
/// - `USB_SERIAL_BRIDGE_SERIAL_BAUD_RATE=115200`
/// - `USB_SERIAL_BRIDGE_IO_WRITE_TIMEOUT_MS=500`
/// - `USB_SERIAL_BRIDGE_LOGGING_LEVEL=debug`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    match collect_env_overrides(config).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Apply every override that parses and return the errors for the rest.
/// A bad variable leaves its field untouched.
fn collect_env_overrides(config: &mut Config) -> Vec<ConfigError> {
    let results = [
        override_from_env("SERIAL_BAUD_RATE", &mut config.serial.baud_rate, "baud rate"),
        override_from_env(
            "READER_POLL_WAIT_MS",
            &mut config.reader.poll_wait_ms,
            "poll wait",
        ),
        override_from_env(
            "READER_BUFFER_SIZE",
            &mut config.reader.buffer_size,
            "buffer size",
        ),
        override_from_env(
            "IO_WRITE_TIMEOUT_MS",
            &mut config.io.write_timeout_ms,
            "timeout",
        ),
    ];

    if let Ok(val) = std::env::var(format!("{}_SERIAL_SLEEP_ON_BACKGROUND", ENV_PREFIX)) {
        config.serial.sleep_on_background = val.to_lowercase() == "true" || val == "1";
    }
    if let Ok(val) = std::env::var(format!("{}_LOGGING_LEVEL", ENV_PREFIX)) {
        config.logging.level = val;
    }

    results.into_iter().filter_map(Result::err).collect()
}
