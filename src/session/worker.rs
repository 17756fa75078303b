//! Command worker owning a [`SerialSession`].
//!
//! The session lives on a dedicated `serial-command` thread. Callers hold a
//! cloneable [`SessionHandle`] and send commands over a channel; the worker
//! executes them strictly in arrival order, one at a time, so a write can
//! never race a close on the same connection.
//!
//! ```text
//! SessionHandle ─┐
//! SessionHandle ─┼──> mpsc (FIFO) ──> serial-command thread ──> SerialSession
//! SessionHandle ─┘                                                 │
//!                                         serial-reader thread <───┘
//! ```

use super::{OpenOptions, ReadListener, SerialSession, SessionStatus, Subscription};
use crate::discovery::{DeviceFilter, DeviceHandle};
use crate::error::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<BridgeResult<T>>;

/// Application lifecycle transitions forwarded to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Background,
    Foreground,
    Teardown,
}

enum Command {
    RequestPermission(DeviceFilter, Reply<DeviceHandle>),
    Open(OpenOptions, Reply<()>),
    Write(Vec<u8>, Reply<usize>),
    WriteHex(String, Reply<usize>),
    Close(Reply<()>),
    RegisterListener(Arc<dyn ReadListener>, oneshot::Sender<Subscription>),
    Lifecycle(LifecycleEvent, oneshot::Sender<()>),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown(oneshot::Sender<()>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::RequestPermission(..) => "requestPermission",
            Self::Open(..) => "open",
            Self::Write(..) => "write",
            Self::WriteHex(..) => "writeHex",
            Self::Close(..) => "close",
            Self::RegisterListener(..) => "registerReadListener",
            Self::Lifecycle(..) => "lifecycle",
            Self::Status(..) => "status",
            Self::Shutdown(..) => "shutdown",
        }
    }
}

/// Cloneable async front of a session worker.
///
/// When the last handle is dropped the worker tears the session down and
/// exits on its own.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    /// Move `session` onto a new command thread.
    pub fn spawn(session: SerialSession) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("serial-command".to_string())
            .spawn(move || run(session, rx))?;

        Ok(Self {
            tx,
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }

    pub async fn request_permission(&self, filter: DeviceFilter) -> BridgeResult<DeviceHandle> {
        self.call(|reply| Command::RequestPermission(filter, reply))
            .await?
    }

    pub async fn open(&self, options: OpenOptions) -> BridgeResult<()> {
        self.call(|reply| Command::Open(options, reply)).await?
    }

    pub async fn write(&self, data: impl Into<Vec<u8>>) -> BridgeResult<usize> {
        let data = data.into();
        self.call(|reply| Command::Write(data, reply)).await?
    }

    pub async fn write_hex(&self, hex: impl Into<String>) -> BridgeResult<usize> {
        let hex = hex.into();
        self.call(|reply| Command::WriteHex(hex, reply)).await?
    }

    pub async fn close(&self) -> BridgeResult<()> {
        self.call(Command::Close).await?
    }

    pub async fn register_read_listener(
        &self,
        listener: Arc<dyn ReadListener>,
    ) -> BridgeResult<Subscription> {
        self.call(|reply| Command::RegisterListener(listener, reply))
            .await
    }

    pub async fn lifecycle(&self, event: LifecycleEvent) -> BridgeResult<()> {
        self.call(|reply| Command::Lifecycle(event, reply)).await
    }

    pub async fn status(&self) -> BridgeResult<SessionStatus> {
        self.call(Command::Status).await
    }

    /// Tear the session down, stop the worker and wait for its thread.
    ///
    /// Commands queued before this one still run. Later calls on any clone
    /// fail with `WorkerStopped`.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        // An already-stopped worker is fine here.
        let _ = self.call(Command::Shutdown).await;
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|_| BridgeError::WorkerStopped)?
                .map_err(|_| BridgeError::WorkerStopped)?;
        }
        Ok(())
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> BridgeResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| BridgeError::WorkerStopped)?;
        response.await.map_err(|_| BridgeError::WorkerStopped)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

fn run(mut session: SerialSession, mut rx: mpsc::UnboundedReceiver<Command>) {
    info!("Session worker started");
    while let Some(command) = rx.blocking_recv() {
        debug!("Action: {}", command.name());
        match command {
            Command::RequestPermission(filter, reply) => {
                respond(reply, session.request_permission(&filter));
            }
            Command::Open(options, reply) => respond(reply, session.open(options)),
            Command::Write(data, reply) => respond(reply, session.write(&data)),
            Command::WriteHex(hex, reply) => respond(reply, session.write_hex(&hex)),
            Command::Close(reply) => respond(reply, session.close()),
            Command::RegisterListener(listener, reply) => {
                let _ = reply.send(session.register_read_listener(listener));
            }
            Command::Lifecycle(event, reply) => {
                match event {
                    LifecycleEvent::Background => session.on_background_enter(),
                    LifecycleEvent::Foreground => session.on_foreground_enter(),
                    LifecycleEvent::Teardown => session.on_teardown(),
                }
                let _ = reply.send(());
            }
            Command::Status(reply) => {
                let _ = reply.send(session.status());
            }
            Command::Shutdown(reply) => {
                session.on_teardown();
                let _ = reply.send(());
                break;
            }
        }
    }
    session.on_teardown();
    info!("Session worker stopped");
}

fn respond<T>(reply: Reply<T>, result: BridgeResult<T>) {
    if let Err(e) = &result {
        warn!("{} ({})", e, e.kind());
    }
    // The caller may have given up waiting; the operation already happened.
    let _ = reply.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::MockDeviceProvider;
    use crate::port::LineParameters;
    use crate::session::{ChannelListener, ReaderConfig, SessionSettings};
    use std::time::Duration;

    fn spawn_with_device() -> (SessionHandle, crate::port::MockDevice) {
        let provider = MockDeviceProvider::new();
        let device = provider.attach(DeviceHandle::new("/dev/ttyACM0", 0x2341, 0x0043));
        let settings = SessionSettings {
            reader: ReaderConfig {
                poll_wait: Duration::from_millis(10),
                ..Default::default()
            },
            ..Default::default()
        };
        let session = SerialSession::with_settings(Arc::new(provider), settings);
        (SessionHandle::spawn(session).unwrap(), device)
    }

    #[tokio::test]
    async fn test_commands_run_in_order() {
        let (handle, device) = spawn_with_device();
        handle.request_permission(DeviceFilter::default()).await.unwrap();
        handle.open(OpenOptions::default()).await.unwrap();

        let writes: Vec<_> = (0..20u8).map(|i| handle.write(vec![i])).collect();
        for (i, write) in writes.into_iter().enumerate() {
            assert_eq!(write.await.unwrap(), 1, "write {i}");
        }
        let log: Vec<u8> = device.write_log().into_iter().flatten().collect();
        assert_eq!(log, (0..20u8).collect::<Vec<_>>());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_echo_reaches_channel_listener() {
        let (handle, device) = spawn_with_device();
        handle.request_permission(DeviceFilter::default()).await.unwrap();
        handle
            .open(OpenOptions::with_parameters(LineParameters {
                baud_rate: 115200,
                ..Default::default()
            }))
            .await
            .unwrap();

        let (listener, mut rx) = ChannelListener::new();
        let subscription = handle
            .register_read_listener(Arc::new(listener))
            .await
            .unwrap();
        assert!(subscription.is_active());

        device.enqueue_read(b"OK\r\n");
        let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chunk, vec![0x4F, 0x4B, 0x0D, 0x0A]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let (handle, device) = spawn_with_device();
        handle.request_permission(DeviceFilter::default()).await.unwrap();
        handle.open(OpenOptions::default()).await.unwrap();

        let other = handle.clone();
        handle.shutdown().await.unwrap();
        assert_eq!(device.open_handles(), 0);

        let err = other.close().await.unwrap_err();
        assert!(matches!(err, BridgeError::WorkerStopped));
        // second shutdown is harmless
        other.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_and_status() {
        let (handle, _device) = spawn_with_device();
        handle.request_permission(DeviceFilter::default()).await.unwrap();
        handle.open(OpenOptions::default()).await.unwrap();

        handle.lifecycle(LifecycleEvent::Background).await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(!status.open);
        assert!(status.suspended);

        handle.lifecycle(LifecycleEvent::Foreground).await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.open);
        assert!(status.reader_active);

        handle.shutdown().await.unwrap();
    }
}
