//! Mock serial device for testing.
//!
//! A [`MockDevice`] stands for one physical device. Every
//! [`MockSerialPort`] connected to it (including clones handed to the
//! background reader) shares the same inbound queue and write log, so a test
//! can keep the device and script it while the session owns the connections.

use super::error::PortError;
use super::traits::{LineParameters, SerialConnection};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct MockDeviceState {
    /// Bytes waiting to be read.
    read_queue: VecDeque<u8>,
    /// Every successful write, in order.
    write_log: Vec<Vec<u8>>,
    /// Every parameter set applied, in order.
    applied: Vec<LineParameters>,
    dtr: bool,
    rts: bool,
    /// Loop written bytes back into the read queue.
    echo: bool,
    /// Fail the next read with this I/O error kind.
    fail_next_read: Option<std::io::ErrorKind>,
    /// Writes time out instead of completing.
    stall_writes: bool,
    /// The device was unplugged; reads and writes fail.
    unplugged: bool,
    /// Connections currently open against the device.
    open_handles: usize,
    /// Connections ever opened (including clones).
    total_handles: usize,
}

#[derive(Debug, Default)]
struct MockShared {
    state: Mutex<MockDeviceState>,
    data_ready: Condvar,
}

/// A scriptable fake device.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use usb_serial_bridge::port::{MockDevice, SerialConnection};
///
/// let device = MockDevice::new("MOCK0");
/// let mut port = device.connect();
///
/// device.enqueue_read(b"OK\r\n");
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer, Duration::from_millis(10)).unwrap();
/// assert_eq!(&buffer[..n], b"OK\r\n");
///
/// port.write_bytes(b"AT\r\n", Duration::from_secs(1)).unwrap();
/// assert_eq!(device.write_log(), vec![b"AT\r\n".to_vec()]);
/// ```
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    shared: Arc<MockShared>,
}

impl MockDevice {
    /// Create a new mock device with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(MockShared::default()),
        }
    }

    /// Device name, used as the port path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a new connection to the device.
    pub fn connect(&self) -> MockSerialPort {
        {
            let mut state = self.shared.state.lock();
            state.open_handles += 1;
            state.total_handles += 1;
        }
        MockSerialPort {
            device: self.clone(),
            closed: false,
        }
    }

    /// Make bytes available to readers, as if the device had sent them.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.shared.state.lock();
        state.read_queue.extend(data);
        self.shared.data_ready.notify_all();
    }

    /// Copy of every write that reached the device.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// Every parameter set applied to the device, oldest first.
    pub fn applied_parameters(&self) -> Vec<LineParameters> {
        self.shared.state.lock().applied.clone()
    }

    /// Current DTR level.
    pub fn dtr(&self) -> bool {
        self.shared.state.lock().dtr
    }

    /// Current RTS level.
    pub fn rts(&self) -> bool {
        self.shared.state.lock().rts
    }

    /// Echo every write back as inbound data.
    pub fn set_echo(&self, echo: bool) {
        self.shared.state.lock().echo = echo;
    }

    /// Fail the next read with the given I/O error kind.
    pub fn fail_next_read(&self, kind: std::io::ErrorKind) {
        let mut state = self.shared.state.lock();
        state.fail_next_read = Some(kind);
        self.shared.data_ready.notify_all();
    }

    /// Make writes time out instead of completing.
    pub fn stall_writes(&self, stall: bool) {
        self.shared.state.lock().stall_writes = stall;
    }

    /// Simulate the cable being pulled.
    pub fn unplug(&self) {
        let mut state = self.shared.state.lock();
        state.unplugged = true;
        self.shared.data_ready.notify_all();
    }

    /// Number of connections currently open against the device.
    pub fn open_handles(&self) -> usize {
        self.shared.state.lock().open_handles
    }

    /// Number of connections ever opened, clones included.
    pub fn total_handles(&self) -> usize {
        self.shared.state.lock().total_handles
    }

    /// Bytes still waiting in the inbound queue.
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }
}

/// One connection to a [`MockDevice`].
#[derive(Debug)]
pub struct MockSerialPort {
    device: MockDevice,
    closed: bool,
}

impl MockSerialPort {
    /// The device this connection belongs to.
    pub fn device(&self) -> &MockDevice {
        &self.device
    }

    fn ensure_open(&self) -> Result<(), PortError> {
        if self.closed {
            Err(PortError::NotOpen)
        } else {
            Ok(())
        }
    }
}

impl SerialConnection for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> Result<usize, PortError> {
        self.ensure_open()?;
        let shared = &self.device.shared;
        let mut state = shared.state.lock();

        if state.unplugged {
            return Err(PortError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        if state.stall_writes {
            return Err(PortError::timeout(timeout));
        }

        state.write_log.push(data.to_vec());
        if state.echo {
            state.read_queue.extend(data);
            shared.data_ready.notify_all();
        }
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        self.ensure_open()?;
        let shared = &self.device.shared;
        let deadline = Instant::now() + timeout;
        let mut state = shared.state.lock();

        loop {
            if let Some(kind) = state.fail_next_read.take() {
                return Err(PortError::Io(kind.into()));
            }
            if state.unplugged {
                return Err(PortError::Io(std::io::ErrorKind::BrokenPipe.into()));
            }
            if !state.read_queue.is_empty() {
                let n = buffer.len().min(state.read_queue.len());
                for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }
            shared.data_ready.wait_for(&mut state, deadline - now);
        }
    }

    fn set_parameters(&mut self, params: &LineParameters) -> Result<(), PortError> {
        self.ensure_open()?;
        self.device.shared.state.lock().applied.push(*params);
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.ensure_open()?;
        self.device.shared.state.lock().dtr = level;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.ensure_open()?;
        self.device.shared.state.lock().rts = level;
        Ok(())
    }

    fn name(&self) -> &str {
        self.device.name()
    }

    fn try_clone_connection(&self) -> Result<Box<dyn SerialConnection>, PortError> {
        self.ensure_open()?;
        Ok(Box::new(self.device.connect()))
    }

    fn close(&mut self) -> Result<(), PortError> {
        if !self.closed {
            self.closed = true;
            let mut state = self.device.shared.state.lock();
            state.open_handles -= 1;
            state.dtr = false;
            state.rts = false;
        }
        Ok(())
    }
}

impl Drop for MockSerialPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
