//! Configuration module for usb-serial-bridge.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `--config <path>` on the command line
//! 2. `USB_SERIAL_BRIDGE_CONFIG` environment variable (explicit path)
//! 3. `./usb-serial-bridge.toml` (current directory)
//! 4. `~/.config/usb-serial-bridge/usb-serial-bridge.toml` (or the platform equivalent)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `USB_SERIAL_BRIDGE_<SECTION>_<KEY>`
//!
//! Examples:
//! - `USB_SERIAL_BRIDGE_SERIAL_BAUD_RATE=115200`
//! - `USB_SERIAL_BRIDGE_SERIAL_SLEEP_ON_BACKGROUND=false`
//! - `USB_SERIAL_BRIDGE_READER_POLL_WAIT_MS=100`
//! - `USB_SERIAL_BRIDGE_READER_BUFFER_SIZE=8192`
//! - `USB_SERIAL_BRIDGE_IO_WRITE_TIMEOUT_MS=500`
//! - `USB_SERIAL_BRIDGE_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use usb_serial_bridge::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Default baud: {}", config.serial.baud_rate);
//! println!("Poll wait: {:?}", config.reader.poll_wait());
//! # Ok::<(), usb_serial_bridge::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, IoConfig, LogFormat, LoggingConfig, ReaderSection, SerialConfig};
