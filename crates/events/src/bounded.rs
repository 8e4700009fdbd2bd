//! Bounded in-memory feed: try-send, drop on full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeedError {
    /// Queue at capacity; the message was dropped.
    #[error("event queue full")]
    Full,
    /// Every subscription handle is gone.
    #[error("event queue disconnected")]
    Disconnected,
}

/// Single-queue feed with a fixed capacity.
///
/// - No IO / no async
/// - `publish` never blocks
/// - Subscriptions share the one receiver
#[derive(Debug)]
pub struct BoundedEventFeed<M> {
    sender: SyncSender<M>,
    receiver: Arc<Mutex<mpsc::Receiver<M>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<M> BoundedEventFeed<M> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<M> EventBus<M> for BoundedEventFeed<M>
where
    M: Send + 'static,
{
    type Error = FeedError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(FeedError::Full)
            }
            Err(TrySendError::Disconnected(_)) => Err(FeedError::Disconnected),
        }
    }

    fn subscribe(&self) -> Subscription<M> {
        Subscription::new(Arc::clone(&self.receiver))
    }
}
