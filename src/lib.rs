//! USB Serial Bridge Library
//!
//! A host-side session manager for a single USB serial device: permission and
//! discovery, open with line parameters, writes, a background reader that
//! pushes inbound bytes to one registered listener, and lifecycle hooks that
//! suspend and resume the connection.
//!
//! # Modules
//!
//! - `port`: Serial connection abstraction, the `serialport` backend and a scriptable mock
//! - `discovery`: USB device enumeration, filters and driver selection
//! - `session`: The session manager, its background reader and the command worker
//! - `bridge`: JSON request/response surface over a session worker
//! - `stdio`: Line-delimited JSON transport on stdin/stdout
//! - `config`: Configuration management with TOML support
//! - `error`: Bridge-level error kinds and messages
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use usb_serial_bridge::discovery::{DeviceFilter, SystemDeviceProvider};
//! use usb_serial_bridge::session::{OpenOptions, SerialSession};
//!
//! let mut session = SerialSession::new(Arc::new(SystemDeviceProvider::new()));
//! session.request_permission(&DeviceFilter::default())?;
//! session.open(OpenOptions::default())?;
//! session.write(b"AT\r\n")?;
//! session.close()?;
//! # Ok::<(), usb_serial_bridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod port;
pub mod session;
pub mod stdio;

// Re-export commonly used types for convenience
pub use bridge::{Bridge, DataEvent, Outbound, Request, Response, ResponseStatus};
pub use discovery::{DeviceFilter, DeviceHandle, DeviceProvider, DriverKind, UsbId};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use port::{DataBits, LineParameters, Parity, PortError, SerialConnection, StopBits};
pub use session::{
    LifecycleEvent, OpenOptions, ReadListener, SerialSession, SessionHandle, SessionSettings,
    SessionStatus, Subscription,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
