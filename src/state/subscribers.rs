use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::events::Event;

/// Generate a new numeric id for subscribers.
///
/// Ids are process-wide, so a handle from one registry never matches an
/// entry of another.
fn next_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Send side of one subscriber's private channel, as seen by a broadcast.
pub type SubscriberSender = (u64, mpsc::Sender<Event>);

/// Set of live event-stream subscribers.
///
/// The lock guards membership only. It is held while inserting, removing or
/// copying senders, never while delivering.
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Event>>>,
    buffer: usize,
}

impl SubscriberRegistry {
    /// `buffer` is the capacity of each subscriber's channel (at least 1).
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, mpsc::Sender<Event>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a channel, add its send side to the set and hand back the
    /// receiving end.
    pub fn register(self: &Arc<Self>) -> SubscriberHandle {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = next_id();

        let live = {
            let mut map = self.subscribers();
            map.insert(id, tx);
            map.len()
        };
        tracing::debug!(subscriber = id, live, "Subscriber registered");

        SubscriberHandle {
            id,
            rx,
            registry: Arc::clone(self),
            registered: true,
        }
    }

    /// Remove `handle` from the set and close its channel.
    ///
    /// Safe to call repeatedly, and with handles this registry never issued.
    pub fn unregister(&self, handle: &mut SubscriberHandle) {
        if !std::ptr::eq(Arc::as_ptr(&handle.registry), self) {
            return;
        }

        // Closing first makes any sender copied by an in-flight broadcast fail.
        handle.rx.close();
        handle.registered = false;

        let removed = {
            let mut map = self.subscribers();
            map.remove(&handle.id).map(|_| map.len())
        };
        if let Some(live) = removed {
            tracing::debug!(subscriber = handle.id, live, "Subscriber unregistered");
        }
    }

    /// Point-in-time copy of every registered sender.
    pub fn snapshot(&self) -> Vec<SubscriberSender> {
        self.subscribers()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving end of one subscriber's channel.
///
/// Dropping the handle unregisters it, so every exit path of an event stream
/// releases its registry entry.
pub struct SubscriberHandle {
    id: u64,
    rx: mpsc::Receiver<Event>,
    registry: Arc<SubscriberRegistry>,
    registered: bool,
}

impl SubscriberHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Wait for the next event. `None` once unregistered and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn unregister(&mut self) {
        let registry = Arc::clone(&self.registry);
        registry.unregister(self);
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        if self.registered {
            self.unregister();
        }
    }
}
