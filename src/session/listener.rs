//! Read listener registration.
//!
//! The session holds at most one listener. Registering a new one replaces the
//! previous registration; the returned [`Subscription`] can cancel its own
//! registration without touching a newer one.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Consumer of inbound bytes.
///
/// Called on the reader thread for every non-empty read, with the raw bytes
/// exactly as received. The reader does not poll the device while a callback
/// runs, so a listener that blocks applies backpressure: unread bytes stay in
/// the transport's own buffer instead of queueing up here. Stopping the
/// reader (close, reopen, suspend) waits for a blocked callback to return.
pub trait ReadListener: Send + Sync {
    fn on_data(&self, data: &[u8]);
}

impl<F> ReadListener for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_data(&self, data: &[u8]) {
        self(data)
    }
}

/// Chunks a [`ChannelListener`] holds before the reader waits for the consumer.
pub const DEFAULT_LISTENER_CAPACITY: usize = 64;

/// Listener that forwards each chunk into a bounded channel.
///
/// Gives an async consumer a typed stream of payloads. When the channel is
/// full the reader thread waits for room; dropping the receiver turns
/// delivery into a no-op.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its stream.
    pub fn new() -> (Self, mpsc::Receiver<Vec<u8>>) {
        Self::with_capacity(DEFAULT_LISTENER_CAPACITY)
    }

    /// Like [`new`](Self::new) with room for `capacity` chunks (at least one).
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ReadListener for ChannelListener {
    fn on_data(&self, data: &[u8]) {
        // Runs on the reader thread, outside any runtime.
        let _ = self.tx.blocking_send(data.to_vec());
    }
}

struct Registration {
    id: u64,
    listener: Arc<dyn ReadListener>,
}

type Slot = Mutex<Option<Registration>>;

/// Shared slot read by the background reader and written by the session.
#[derive(Clone, Default)]
pub(crate) struct ListenerSlot {
    slot: Arc<Slot>,
    next_id: Arc<AtomicU64>,
}

impl ListenerSlot {
    /// Install `listener`, discarding any previous registration.
    pub(crate) fn replace(&self, listener: Arc<dyn ReadListener>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        *self.slot.lock() = Some(Registration { id, listener });
        Subscription {
            id,
            slot: Arc::downgrade(&self.slot),
        }
    }

    /// Deliver `data` to the current listener, if any.
    ///
    /// The lock is released before the callback runs so a listener may
    /// register or cancel from inside `on_data`.
    pub(crate) fn dispatch(&self, data: &[u8]) -> bool {
        let listener = self.slot.lock().as_ref().map(|r| Arc::clone(&r.listener));
        match listener {
            Some(listener) => {
                listener.on_data(data);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl std::fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Handle to one listener registration.
///
/// Dropping it keeps the listener registered; call [`cancel`](Self::cancel)
/// to stop delivery.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    slot: Weak<Slot>,
}

impl Subscription {
    /// Remove this registration if it is still the current one.
    ///
    /// Returns `false` when it had already been replaced or cancelled.
    pub fn cancel(&self) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        let mut current = slot.lock();
        if current.as_ref().is_some_and(|r| r.id == self.id) {
            *current = None;
            true
        } else {
            false
        }
    }

    /// Whether this registration still receives data.
    pub fn is_active(&self) -> bool {
        self.slot
            .upgrade()
            .is_some_and(|slot| slot.lock().as_ref().is_some_and(|r| r.id == self.id))
    }
}
