//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All sections are optional in the file and fall back to the defaults here.

use super::error::{ConfigError, ConfigResult};
use crate::discovery::DeviceFilter;
use crate::port::{DataBits, LineParameters, Parity, StopBits};
use crate::session::{OpenOptions, ReaderConfig, SessionSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default line parameters and sleep policy for `openSerial`
    pub serial: SerialConfig,
    /// Background reader tuning
    pub reader: ReaderSection,
    /// Write bounds
    pub io: IoConfig,
    /// Default device filter for `requestPermission`
    pub discovery: DeviceFilter,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values that would make the session misbehave.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation(
                "serial.baud_rate",
                "must be greater than zero",
            ));
        }
        DataBits::try_from(self.serial.data_bits)
            .map_err(|e| ConfigError::validation("serial.data_bits", e))?;
        StopBits::try_from(self.serial.stop_bits)
            .map_err(|e| ConfigError::validation("serial.stop_bits", e))?;
        Parity::try_from(self.serial.parity)
            .map_err(|e| ConfigError::validation("serial.parity", e))?;
        if self.reader.poll_wait_ms == 0 {
            return Err(ConfigError::validation(
                "reader.poll_wait_ms",
                "must be greater than zero",
            ));
        }
        if self.reader.buffer_size == 0 {
            return Err(ConfigError::validation(
                "reader.buffer_size",
                "must be greater than zero",
            ));
        }
        if self.io.write_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "io.write_timeout_ms",
                "must be greater than zero",
            ));
        }
        self.discovery
            .match_rule()
            .map_err(|e| ConfigError::validation("discovery.driver", e.to_string()))?;
        Ok(())
    }

    /// Session timing derived from the `[reader]` and `[io]` sections.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            write_timeout: self.io.write_timeout(),
            reader: ReaderConfig {
                poll_wait: self.reader.poll_wait(),
                buffer_size: self.reader.buffer_size,
            },
        }
    }

    /// Defaults applied to `openSerial` fields the caller leaves out.
    pub fn open_defaults(&self) -> ConfigResult<OpenOptions> {
        self.validate()?;
        let serial = &self.serial;
        let to_err = |key: &str| {
            let key = key.to_string();
            move |e: String| ConfigError::validation(key, e)
        };
        Ok(OpenOptions {
            parameters: LineParameters {
                baud_rate: serial.baud_rate,
                data_bits: DataBits::try_from(serial.data_bits).map_err(to_err("serial.data_bits"))?,
                stop_bits: StopBits::try_from(serial.stop_bits).map_err(to_err("serial.stop_bits"))?,
                parity: Parity::try_from(serial.parity).map_err(to_err("serial.parity"))?,
                dtr_enabled: serial.dtr,
                rts_enabled: serial.rts,
            },
            sleep_on_background: serial.sleep_on_background,
        })
    }
}

/// Serial defaults section, using the bridge's integer encodings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// 5 to 8
    pub data_bits: u8,
    /// 1, 3 (one and a half) or 2
    pub stop_bits: u8,
    /// 0 none, 1 odd, 2 even, 3 mark, 4 space
    pub parity: u8,
    pub dtr: bool,
    pub rts: bool,
    /// Close the port while the host is in the background
    pub sleep_on_background: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: 0,
            dtr: false,
            rts: false,
            sleep_on_background: true,
        }
    }
}

/// Background reader section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSection {
    /// Wait per poll iteration in milliseconds
    pub poll_wait_ms: u64,
    /// Scratch buffer size in bytes
    pub buffer_size: usize,
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            poll_wait_ms: 200,
            buffer_size: 4096,
        }
    }
}

impl ReaderSection {
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }
}

/// I/O bounds section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Upper bound on a single write in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 1000,
        }
    }
}

impl IoConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive, e.g. "info" or "usb_serial_bridge=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}
