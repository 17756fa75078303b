//! Serial session manager.
//!
//! A [`SerialSession`] owns at most one open connection, the line parameters
//! applied to it, at most one background reader and at most one read
//! listener. All operations take `&mut self`; concurrent callers go through
//! the [`worker`] which serializes them on a single thread.
//!
//! # Lifecycle
//!
//! ```text
//! request_permission ──> open ──> write / register_read_listener ──> close
//!                         │  ▲
//!     on_background_enter │  │ on_foreground_enter   (sleep_on_background only)
//!                         ▼  │
//!                       suspended
//! ```

mod listener;
mod reader;
pub mod worker;

pub use listener::{ChannelListener, ReadListener, Subscription, DEFAULT_LISTENER_CAPACITY};
pub use reader::{ReaderConfig, ReaderExit, ReaderFailure, DEFAULT_BUFFER_SIZE, DEFAULT_POLL_WAIT};
pub use worker::{LifecycleEvent, SessionHandle};

use crate::discovery::{AccessDecision, DeviceFilter, DeviceHandle, DeviceProvider};
use crate::error::{BridgeError, BridgeResult};
use crate::port::{apply_parameters, LineParameters, SerialConnection};
use listener::ListenerSlot;
use reader::BackgroundReader;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on a single write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub write_timeout: Duration,
    pub reader: ReaderConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            reader: ReaderConfig::default(),
        }
    }
}

/// Everything `open` needs besides the granted device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOptions {
    #[serde(flatten)]
    pub parameters: LineParameters,

    /// Close the port while the application is in the background and reopen
    /// it on return.
    #[serde(rename = "sleepOnPause", default = "default_sleep_on_background")]
    pub sleep_on_background: bool,
}

fn default_sleep_on_background() -> bool {
    true
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            parameters: LineParameters::default(),
            sleep_on_background: default_sleep_on_background(),
        }
    }
}

impl OpenOptions {
    /// Options with the given parameters and the default sleep policy.
    pub fn with_parameters(parameters: LineParameters) -> Self {
        Self {
            parameters,
            ..Default::default()
        }
    }

    /// Parse bridge options, taking every missing field from `defaults`.
    pub fn from_json(
        opts: Option<&serde_json::Value>,
        defaults: &OpenOptions,
    ) -> BridgeResult<Self> {
        let mut merged = serde_json::to_value(defaults)?;
        match opts {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Object(overrides)) => {
                if let serde_json::Value::Object(base) = &mut merged {
                    for (key, value) in overrides {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
            Some(other) => {
                return Err(BridgeError::invalid(format!(
                    "open options must be an object, got {other}"
                )))
            }
        }
        let options: OpenOptions = serde_json::from_value(merged)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.parameters.baud_rate == 0 {
            return Err(BridgeError::invalid("baudRate must be greater than zero"));
        }
        Ok(())
    }
}

/// Snapshot of a session, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub open: bool,
    pub reader_active: bool,
    pub listener_registered: bool,
    pub suspended: bool,
    pub sleep_on_background: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<LineParameters>,
}

/// The single stateful entity of the bridge.
pub struct SerialSession {
    provider: Arc<dyn DeviceProvider>,
    settings: SessionSettings,
    /// Last granted device; survives close and suspend.
    device: Option<DeviceHandle>,
    connection: Option<Box<dyn SerialConnection>>,
    /// Options applied by the last successful open.
    options: Option<OpenOptions>,
    reader: Option<BackgroundReader>,
    listeners: ListenerSlot,
    /// Closed by `on_background_enter`, waiting for the foreground.
    suspended: bool,
}

impl SerialSession {
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        Self::with_settings(provider, SessionSettings::default())
    }

    pub fn with_settings(provider: Arc<dyn DeviceProvider>, settings: SessionSettings) -> Self {
        Self {
            provider,
            settings,
            device: None,
            connection: None,
            options: None,
            reader: None,
            listeners: ListenerSlot::default(),
            suspended: false,
        }
    }

    /// Find a device and ask for access to it.
    ///
    /// On success the handle is remembered for later `open` calls. An
    /// already-open connection is left alone.
    pub fn request_permission(&mut self, filter: &DeviceFilter) -> BridgeResult<DeviceHandle> {
        let device = self.provider.discover(filter)?;
        match self.provider.request_access(&device) {
            AccessDecision::Granted => {
                info!(
                    "Permission granted for {} ({:04x}:{:04x}, {})",
                    device.port_name, device.vid, device.pid, device.driver
                );
                self.device = Some(device.clone());
                Ok(device)
            }
            AccessDecision::Denied => {
                warn!("Permission denied for {}", device.port_name);
                Err(BridgeError::AccessDenied(device.port_name))
            }
        }
    }

    /// Open the granted device with `options`.
    ///
    /// Any running reader and open connection are torn down first, so at most
    /// one reader ever exists.
    pub fn open(&mut self, options: OpenOptions) -> BridgeResult<()> {
        let device = self
            .device
            .clone()
            .ok_or(BridgeError::PermissionNotGranted)?;
        options.validate()?;

        self.stop_reader();
        self.release_connection();
        self.suspended = false;

        let connection = self.connect(&device, &options.parameters)?;
        self.connection = Some(connection);
        self.options = Some(options);

        if let Err(e) = self.restart_reader() {
            self.release_connection();
            return Err(e);
        }
        info!(
            "Serial port opened: {} at {} baud",
            device.port_name, options.parameters.baud_rate
        );
        Ok(())
    }

    /// Write `data`, bounded by the write timeout.
    pub fn write(&mut self, data: &[u8]) -> BridgeResult<usize> {
        let timeout = self.settings.write_timeout;
        let connection = self.connection.as_mut().ok_or(BridgeError::PortNotOpen)?;
        let written = connection.write_bytes(data, timeout)?;
        debug!("Wrote {} byte(s) to {}", written, connection.name());
        Ok(written)
    }

    /// Decode a hexadecimal string and write the bytes.
    pub fn write_hex(&mut self, hex: &str) -> BridgeResult<usize> {
        let bytes = decode_hex(hex)?;
        self.write(&bytes)
    }

    /// Stop the reader and release the connection. Closing an idle session
    /// succeeds.
    pub fn close(&mut self) -> BridgeResult<()> {
        self.stop_reader();
        self.release_connection();
        self.suspended = false;
        // Nothing to start while closed; keeps reader state consistent.
        self.restart_reader()?;
        info!("Serial port closed");
        Ok(())
    }

    /// Install the consumer of inbound bytes, replacing any previous one.
    pub fn register_read_listener(&mut self, listener: Arc<dyn ReadListener>) -> Subscription {
        debug!("Registering read listener");
        self.listeners.replace(listener)
    }

    /// The application lost foreground focus.
    pub fn on_background_enter(&mut self) {
        if !self.sleep_on_background() {
            return;
        }
        let was_open = self.connection.is_some();
        self.stop_reader();
        self.release_connection();
        if was_open {
            self.suspended = true;
            info!("Serial port suspended while in background");
        }
    }

    /// The application regained foreground focus.
    ///
    /// Reopens a suspended connection with the stored parameters. Failures
    /// are logged; there is no caller to report them to.
    pub fn on_foreground_enter(&mut self) {
        if !self.sleep_on_background() {
            return;
        }
        if !self.suspended {
            debug!("No serial device to resume");
            return;
        }
        let (Some(device), Some(options)) = (self.device.clone(), self.options) else {
            debug!("No serial device to resume");
            self.suspended = false;
            return;
        };
        self.suspended = false;

        match self.connect(&device, &options.parameters) {
            Ok(connection) => {
                self.connection = Some(connection);
                info!("Serial port resumed: {}", device.port_name);
            }
            Err(e) => {
                warn!("Failed to resume {}: {}", device.port_name, e);
                return;
            }
        }
        if let Err(e) = self.restart_reader() {
            warn!("Failed to restart reader after resume: {}", e);
        }
    }

    /// The host is going away: stop everything unconditionally.
    pub fn on_teardown(&mut self) {
        self.stop_reader();
        self.release_connection();
        self.suspended = false;
        debug!("Session torn down");
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    pub fn reader_active(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| r.is_running())
    }

    /// Parameters applied by the last successful open.
    pub fn parameters(&self) -> Option<&LineParameters> {
        self.options.as_ref().map(|o| &o.parameters)
    }

    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    pub fn sleep_on_background(&self) -> bool {
        self.options.is_some_and(|o| o.sleep_on_background)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            open: self.is_open(),
            reader_active: self.reader_active(),
            listener_registered: self.listeners.is_registered(),
            suspended: self.suspended,
            sleep_on_background: self.sleep_on_background(),
            device: self.device.clone(),
            parameters: self.parameters().copied(),
        }
    }

    fn connect(
        &self,
        device: &DeviceHandle,
        parameters: &LineParameters,
    ) -> BridgeResult<Box<dyn SerialConnection>> {
        let mut connection = self
            .provider
            .open(device)
            .map_err(BridgeError::connection)?;
        if let Err(e) = apply_parameters(connection.as_mut(), parameters) {
            let _ = connection.close();
            return Err(BridgeError::connection(e));
        }
        Ok(connection)
    }

    /// Stop the current reader (if any) and start a fresh one on the open
    /// connection (if any).
    fn restart_reader(&mut self) -> BridgeResult<()> {
        self.stop_reader();
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        let reader_handle = connection
            .try_clone_connection()
            .map_err(|e| BridgeError::ConnectionFailed(format!("Error on opening port: {e}")))?;
        let reader = BackgroundReader::spawn(
            reader_handle,
            self.listeners.clone(),
            self.settings.reader,
        )
        .map_err(|e| BridgeError::ConnectionFailed(format!("Error on opening port: {e}")))?;
        self.reader = Some(reader);
        Ok(())
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            let exit = reader.stop();
            debug!("Reader exit: {:?}", exit);
        }
    }

    fn release_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                warn!("Error closing {}: {}", connection.name(), e);
            }
        }
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.on_teardown();
    }
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("device", &self.device)
            .field("connection", &self.connection)
            .field("options", &self.options)
            .field("reader", &self.reader)
            .field("listeners", &self.listeners)
            .field("suspended", &self.suspended)
            .finish()
    }
}

/// Decode hex text, ignoring whitespace. Case-insensitive.
pub fn decode_hex(hex: &str) -> BridgeResult<Vec<u8>> {
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(BridgeError::invalid("hex data must have an even number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(high), Some(low)) => Ok(high << 4 | low),
            _ => Err(BridgeError::invalid(format!(
                "invalid hex byte: {:?}",
                String::from_utf8_lossy(pair)
            ))),
        })
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|v| v as u8)
}
