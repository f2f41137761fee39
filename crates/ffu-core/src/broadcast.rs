//! Publish/subscribe fan-out of status events to live observers.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: when a
//! subscriber's queue is full the event is dropped for that subscriber
//! only, and subscribers whose receiving side is gone are pruned. The
//! registry lock is held for the whole fan-out, so every subscriber sees
//! events in publish order. Late subscribers get no history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::status::StatusRecord;

/// Identifier handed out by [`StatusBroadcaster::subscribe`].
pub type SubscriberId = u64;

/// A raw status line together with the snapshot it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub message: String,
    pub status: StatusRecord,
}

impl StatusEvent {
    pub fn new(message: impl Into<String>, status: StatusRecord) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<StatusEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event; `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.receiver.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.receiver.try_recv().ok()
    }
}

struct BroadcasterInner {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<StatusEvent>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    buffer: usize,
}

/// Fan-out hub for [`StatusEvent`]s. Cloning shares the same registry.
#[derive(Clone)]
pub struct StatusBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl StatusBroadcaster {
    /// Create a broadcaster whose subscribers each buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.inner.buffer);
        self.inner.subscribers.lock().insert(id, tx);
        debug!(subscriber = id, "status subscriber registered");
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "status subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every registered subscriber without blocking.
    ///
    /// Returns the number of subscribers that accepted the event.
    pub fn publish(&self, event: StatusEvent) -> usize {
        let mut delivered = 0;
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(subscriber = *id, "subscriber queue full, dropping status event");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = *id, "pruning closed status subscriber");
                false
            }
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Total events dropped because a subscriber's queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(crate::config::BroadcastConfig::default().subscriber_buffer)
    }
}

impl std::fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}
