//! Port abstraction layer for serial communication.
//!
//! Provides the `SerialConnection` trait with a real implementation over the
//! `serialport` crate and a scriptable mock for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockDevice, MockSerialPort};
pub use sync_port::SystemSerialPort;
pub use traits::*;
