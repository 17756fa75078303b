//! Session-level errors.
//!
//! Every failure reported to a caller carries a human-readable message and a
//! stable [`ErrorKind`] so clients never have to match on message text.

use crate::port::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A specialized `Result` type for session and bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    PermissionNotGranted,
    DeviceNotFound,
    ConnectionFailed,
    PortNotOpen,
    IoFailure,
    UnknownDriver,
    InvalidArgument,
    WorkerStopped,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PermissionNotGranted => "permissionNotGranted",
            Self::DeviceNotFound => "deviceNotFound",
            Self::ConnectionFailed => "connectionFailed",
            Self::PortNotOpen => "portNotOpen",
            Self::IoFailure => "ioFailure",
            Self::UnknownDriver => "unknownDriver",
            Self::InvalidArgument => "invalidArgument",
            Self::WorkerStopped => "workerStopped",
        };
        f.write_str(name)
    }
}

/// Unified error type for the serial session and its command surface.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `open` was called before a device was granted.
    #[error("Request permissions before attempting opening port")]
    PermissionNotGranted,

    /// Access to the discovered device was refused.
    #[error("Permission denied for device {0}")]
    AccessDenied(String),

    /// Discovery found no matching device.
    #[error("No device found!")]
    DeviceNotFound,

    /// The device could not be opened or configured.
    #[error("{0}")]
    ConnectionFailed(String),

    /// Operation requires an open port.
    #[error("Writing a closed port.")]
    PortNotOpen,

    /// Read/write failure on an open port.
    #[error("{0}")]
    Io(#[from] PortError),

    /// The driver name in the discovery filter is not recognised.
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// Malformed options or payload.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The command worker has shut down.
    #[error("Serial session worker has stopped")]
    WorkerStopped,
}

impl BridgeError {
    /// Stable category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionNotGranted | Self::AccessDenied(_) => ErrorKind::PermissionNotGranted,
            Self::DeviceNotFound => ErrorKind::DeviceNotFound,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::PortNotOpen => ErrorKind::PortNotOpen,
            Self::Io(_) => ErrorKind::IoFailure,
            Self::UnknownDriver(_) => ErrorKind::UnknownDriver,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::WorkerStopped => ErrorKind::WorkerStopped,
        }
    }

    /// Create an InvalidArgument error from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Wrap a port failure that happened while opening or configuring.
    pub fn connection(err: PortError) -> Self {
        Self::ConnectionFailed(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
