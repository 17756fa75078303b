//! Port-specific error types.
//!
//! Connection-level failures, kept separate from the session-level
//! [`BridgeError`](crate::error::BridgeError) so the port layer does not know
//! about permissions or listeners.

use thiserror::Error;

/// Errors that can occur during serial connection operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The device node disappeared or was never there.
    #[error("Serial device not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested line parameters cannot be applied.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The connection has already been released.
    #[error("Port is not open")]
    NotOpen,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Whether the error means the device is gone rather than a transient fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::NotOpen => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionAborted
            ),
            Self::Serial(e) => e.kind() == serialport::ErrorKind::NoDevice,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortError::not_found("/dev/ttyACM0");
        assert_eq!(err.to_string(), "Serial device not found: /dev/ttyACM0");

        let err = PortError::config("1.5 stop bits not supported");
        assert_eq!(
            err.to_string(),
            "Configuration error: 1.5 stop bits not supported"
        );

        assert_eq!(PortError::NotOpen.to_string(), "Port is not open");
    }

    #[test]
    fn test_timeout_error() {
        let duration = std::time::Duration::from_millis(1000);
        let err = PortError::timeout(duration);
        assert!(err.to_string().contains("1s"));
        assert!(!err.is_disconnect());
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(PortError::NotOpen.is_disconnect());
        assert!(PortError::not_found("x").is_disconnect());
        let broken = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "unplugged",
        ));
        assert!(broken.is_disconnect());
        let other = PortError::Io(std::io::Error::other("glitch"));
        assert!(!other.is_disconnect());
    }
}
