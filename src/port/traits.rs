//! Core traits for serial connection abstraction.
//!
//! Defines the `SerialConnection` trait that lets real serial ports and the
//! mock be used interchangeably by the session and its background reader,
//! plus the line parameter types applied on open.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Line parameters applied to a connection when it is opened.
///
/// Once applied they stay fixed until the port is reopened; the session keeps
/// a copy so a background suspend can reapply them verbatim on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineParameters {
    /// Baud rate (bits per second), always greater than zero.
    pub baud_rate: u32,

    /// Number of data bits per character.
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Assert the DTR line after the parameters are applied.
    #[serde(rename = "dtr")]
    pub dtr_enabled: bool,

    /// Assert the RTS line after the parameters are applied.
    #[serde(rename = "rts")]
    pub rts_enabled: bool,
}

impl Default for LineParameters {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            dtr_enabled: false,
            rts_enabled: false,
        }
    }
}

/// Number of data bits per character.
///
/// Encoded on the wire as the plain bit count (5 to 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("unsupported data bits: {other}")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Number of stop bits.
///
/// Wire encoding follows the USB driver convention: 1, 3 (one and a half), 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            3 => Ok(Self::OnePointFive),
            2 => Ok(Self::Two),
            other => Err(format!("unsupported stop bits: {other}")),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::OnePointFive => 3,
            StopBits::Two => 2,
        }
    }
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = PortError;

    fn try_from(bits: StopBits) -> Result<Self, Self::Error> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OnePointFive => Err(PortError::config(
                "1.5 stop bits are not supported by this backend",
            )),
        }
    }
}

/// Parity checking modes.
///
/// Wire encoding: 0 none, 1 odd, 2 even, 3 mark, 4 space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl TryFrom<u8> for Parity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Odd),
            2 => Ok(Self::Even),
            3 => Ok(Self::Mark),
            4 => Ok(Self::Space),
            other => Err(format!("unsupported parity: {other}")),
        }
    }
}

impl From<Parity> for u8 {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
            Parity::Mark => 3,
            Parity::Space => 4,
        }
    }
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::config(format!(
                "{parity:?} parity is not supported by this backend"
            ))),
        }
    }
}

/// An open serial connection.
///
/// Implementations must allow a second handle via [`try_clone_connection`]
/// so the background reader can poll while the command side writes.
///
/// [`try_clone_connection`]: SerialConnection::try_clone_connection
pub trait SerialConnection: Send + std::fmt::Debug {
    /// Write all of `data`, failing if it cannot complete within `timeout`.
    ///
    /// Returns the number of bytes written.
    fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> Result<usize, PortError>;

    /// Wait up to `timeout` for inbound bytes.
    ///
    /// Returns `Ok(0)` when the wait elapses with nothing received.
    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError>;

    /// Apply baud rate, framing and parity.
    fn set_parameters(&mut self, params: &LineParameters) -> Result<(), PortError>;

    /// Drive the DTR control line.
    fn set_dtr(&mut self, level: bool) -> Result<(), PortError>;

    /// Drive the RTS control line.
    fn set_rts(&mut self, level: bool) -> Result<(), PortError>;

    /// Get the name/path of the underlying device.
    fn name(&self) -> &str;

    /// Create an independent handle onto the same device.
    fn try_clone_connection(&self) -> Result<Box<dyn SerialConnection>, PortError>;

    /// Release the device. Further calls on this handle fail with `NotOpen`.
    fn close(&mut self) -> Result<(), PortError>;
}

/// Apply a full parameter set to a freshly opened connection.
///
/// Parameters first, then the control lines that were asked for. Lines that
/// were not requested are left untouched.
pub fn apply_parameters(
    connection: &mut dyn SerialConnection,
    params: &LineParameters,
) -> Result<(), PortError> {
    if params.baud_rate == 0 {
        return Err(PortError::config("baud rate must be greater than zero"));
    }
    connection.set_parameters(params)?;
    if params.dtr_enabled {
        connection.set_dtr(true)?;
    }
    if params.rts_enabled {
        connection.set_rts(true)?;
    }
    Ok(())
}
