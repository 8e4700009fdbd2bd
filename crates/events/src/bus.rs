//! Event publishing/subscription abstraction (mechanics only).
//!
//! Delivery is best-effort: a full queue drops the message instead of
//! blocking the publisher. Consumers that need the authoritative state poll
//! the job record.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a live-feed consumer sees on each wait.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem<M> {
    Event(M),
    /// Nothing arrived within the heartbeat interval.
    Ping,
    /// The feed is gone (publisher dropped or job missing).
    Closed,
}

/// A subscription to an event stream.
///
/// ```ignore
/// let subscription = feed.subscribe();
///
/// loop {
///     match subscription.next(Duration::from_secs(15)) {
///         FeedItem::Event(event) => forward(event),
///         FeedItem::Ping => send_keepalive(),
///         FeedItem::Closed => break,
///     }
/// }
/// ```
///
/// Clones share one receiver: each message is seen by exactly one of them.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Arc<Mutex<Receiver<M>>>,
}

impl<M> Clone for Subscription<M> {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
        }
    }
}

impl<M> Subscription<M> {
    pub fn new(receiver: Arc<Mutex<Receiver<M>>>) -> Self {
        Self { receiver }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        match self.receiver.lock() {
            Ok(rx) => rx.try_recv(),
            Err(_) => Err(TryRecvError::Disconnected),
        }
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        match self.receiver.lock() {
            Ok(rx) => rx.recv_timeout(timeout),
            Err(_) => Err(RecvTimeoutError::Disconnected),
        }
    }

    /// Wait up to `heartbeat` and map the outcome onto a feed item.
    pub fn next(&self, heartbeat: Duration) -> FeedItem<M> {
        match self.recv_timeout(heartbeat) {
            Ok(message) => FeedItem::Event(message),
            Err(RecvTimeoutError::Timeout) => FeedItem::Ping,
            Err(RecvTimeoutError::Disconnected) => FeedItem::Closed,
        }
    }
}

/// Domain-agnostic publish side of an event feed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Enqueue without blocking; implementations may drop on overflow.
    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
