//! Background reader thread.
//!
//! One poll loop per open connection. Each iteration waits up to the poll
//! interval for inbound bytes and forwards anything received, untouched, to
//! the current listener. A read error ends the loop; it is never restarted
//! from here.

use super::listener::ListenerSlot;
use crate::port::{PortError, SerialConnection};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default wait per poll iteration.
pub const DEFAULT_POLL_WAIT: Duration = Duration::from_millis(200);

/// Default scratch buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Poll loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    pub poll_wait: Duration,
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_wait: DEFAULT_POLL_WAIT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Why a reader stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReaderFailure {
    /// The device went away.
    Disconnected,
    /// The transport reported a timeout instead of an empty read.
    Timeout,
    /// Any other I/O or driver error.
    Io,
}

impl ReaderFailure {
    pub fn classify(err: &PortError) -> Self {
        if err.is_disconnect() {
            return Self::Disconnected;
        }
        match err {
            PortError::Timeout(_) => Self::Timeout,
            PortError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io,
        }
    }
}

/// How a reader thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Stopped on request.
    Stopped,
    /// Terminated by a read error.
    Failed(ReaderFailure),
}

/// Owner of one running reader thread.
///
/// Dropping it stops the thread and waits for it.
#[derive(Debug)]
pub(crate) struct BackgroundReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<ReaderExit>>,
    port_name: String,
}

impl BackgroundReader {
    /// Start polling `connection` on a dedicated thread.
    ///
    /// The reader owns `connection` and closes it when it exits.
    pub(crate) fn spawn(
        connection: Box<dyn SerialConnection>,
        listeners: ListenerSlot,
        config: ReaderConfig,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let port_name = connection.name().to_string();
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || run(connection, listeners, flag, config))?;

        info!("Started reader on {}", port_name);
        Ok(Self {
            stop,
            handle: Some(handle),
            port_name,
        })
    }

    /// Whether the loop is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop and block until the thread has exited.
    ///
    /// Returns after the thread has dropped its listener reference and closed
    /// its connection handle. Blocks for at most one poll interval plus one
    /// listener callback.
    pub(crate) fn stop(mut self) -> ReaderExit {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ReaderExit {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return ReaderExit::Stopped;
        };
        let exit = match handle.join() {
            Ok(exit) => exit,
            Err(_) => {
                warn!("Reader thread for {} panicked", self.port_name);
                ReaderExit::Failed(ReaderFailure::Io)
            }
        };
        info!("Stopped reader on {} ({:?})", self.port_name, exit);
        exit
    }
}

impl Drop for BackgroundReader {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn run(
    mut connection: Box<dyn SerialConnection>,
    listeners: ListenerSlot,
    stop: Arc<AtomicBool>,
    config: ReaderConfig,
) -> ReaderExit {
    let mut buffer = vec![0u8; config.buffer_size];

    let exit = loop {
        if stop.load(Ordering::Acquire) {
            break ReaderExit::Stopped;
        }
        match connection.read_bytes(&mut buffer, config.poll_wait) {
            Ok(0) => continue,
            Ok(n) => {
                let delivered = listeners.dispatch(&buffer[..n]);
                debug!("Read {} byte(s), delivered: {}", n, delivered);
            }
            Err(e) => {
                let failure = ReaderFailure::classify(&e);
                warn!(
                    "Reader on {} stopped: {} ({:?})",
                    connection.name(),
                    e,
                    failure
                );
                break ReaderExit::Failed(failure);
            }
        }
    };

    if let Err(e) = connection.close() {
        debug!("Reader handle close failed: {}", e);
    }
    exit
}
