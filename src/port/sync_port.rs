//! Serial connection backed by the `serialport` crate.
//!
//! Wraps `serialport::SerialPort` with the `SerialConnection` trait so the
//! session can open, configure, clone and release real devices.

use super::error::PortError;
use super::traits::{LineParameters, SerialConnection};
use std::io::{Read, Write};
use std::time::Duration;

/// Baud rate used for the initial open, before parameters are applied.
const INITIAL_BAUD_RATE: u32 = 9600;

/// Serial connection wrapping `serialport::SerialPort`.
pub struct SystemSerialPort {
    /// The underlying port; `None` once closed.
    port: Option<Box<dyn serialport::SerialPort>>,
    /// The port name/path for identification.
    name: String,
}

impl SystemSerialPort {
    /// Open a serial device by path.
    ///
    /// The device is opened at 9600 8N1; callers apply the real parameters
    /// afterwards with [`apply_parameters`](super::traits::apply_parameters).
    ///
    /// # Example
    /// ```no_run
    /// use usb_serial_bridge::port::{apply_parameters, LineParameters, SystemSerialPort};
    ///
    /// let mut port = SystemSerialPort::open("/dev/ttyACM0")?;
    /// apply_parameters(&mut port, &LineParameters::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str) -> Result<Self, PortError> {
        let port = serialport::new(port_name, INITIAL_BAUD_RATE)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self::from_port(port, port_name))
    }

    fn from_port(port: Box<dyn serialport::SerialPort>, name: &str) -> Self {
        Self {
            port: Some(port),
            name: name.to_string(),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }

    /// Set the timeout before every operation. On Windows, cloned handles
    /// share one set of COMMTIMEOUTS, so another handle may have changed it.
    fn ensure_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port_mut()?.set_timeout(timeout)?;
        Ok(())
    }
}

impl SerialConnection for SystemSerialPort {
    fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> Result<usize, PortError> {
        self.ensure_timeout(timeout)?;
        let port = self.port_mut()?;
        match port.write_all(data).and_then(|_| port.flush()) {
            Ok(()) => Ok(data.len()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(PortError::timeout(timeout)),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        self.ensure_timeout(timeout)?;
        match self.port_mut()?.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn set_parameters(&mut self, params: &LineParameters) -> Result<(), PortError> {
        let stop_bits: serialport::StopBits = params.stop_bits.try_into()?;
        let parity: serialport::Parity = params.parity.try_into()?;
        let port = self.port_mut()?;
        port.set_baud_rate(params.baud_rate)?;
        port.set_data_bits(params.data_bits.into())?;
        port.set_stop_bits(stop_bits)?;
        port.set_parity(parity)?;
        port.set_flow_control(serialport::FlowControl::None)?;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.port_mut()?
            .write_data_terminal_ready(level)
            .map_err(PortError::Serial)
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.port_mut()?
            .write_request_to_send(level)
            .map_err(PortError::Serial)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone_connection(&self) -> Result<Box<dyn SerialConnection>, PortError> {
        let port = self.port.as_ref().ok_or(PortError::NotOpen)?;
        let clone = port.try_clone()?;
        Ok(Box::new(Self::from_port(clone, &self.name)))
    }

    fn close(&mut self) -> Result<(), PortError> {
        // serialport releases the device on drop
        self.port = None;
        Ok(())
    }
}

impl std::fmt::Debug for SystemSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSerialPort")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .field(
                "baud_rate",
                &self.port.as_ref().and_then(|p| p.baud_rate().ok()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_not_found_error() {
        let result = SystemSerialPort::open("/dev/nonexistent_usb_serial_12345");

        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            Err(PortError::Serial(_)) | Err(PortError::Io(_)) => {}
            Err(e) => panic!("Expected NotFound error, got: {:?}", e),
            Ok(_) => panic!("Opening a nonexistent device must fail"),
        }
    }

    #[cfg(unix)]
    #[test]
    #[serial_test::serial]
    fn test_cloned_handles_keep_their_own_timeouts() {
        // openpty may be unavailable in minimal containers
        let Ok((_master, slave)) = serialport::TTYPort::pair() else {
            return;
        };
        let mut original = SystemSerialPort::from_port(Box::new(slave), "pty");
        let mut clone = original.try_clone_connection().unwrap();
        let mut buffer = [0u8; 8];

        assert_eq!(original.read_bytes(&mut buffer, Duration::from_millis(20)).unwrap(), 0);
        assert_eq!(clone.read_bytes(&mut buffer, Duration::from_millis(300)).unwrap(), 0);

        // The clone's longer timeout must not leak into the original
        let started = std::time::Instant::now();
        assert_eq!(original.read_bytes(&mut buffer, Duration::from_millis(20)).unwrap(), 0);
        assert!(started.elapsed() < Duration::from_millis(250));

        clone.close().unwrap();
        original.close().unwrap();
        assert!(matches!(
            original.read_bytes(&mut buffer, Duration::from_millis(20)),
            Err(PortError::NotOpen)
        ));
    }
}
