//! `chunkflow-events`
//!
//! Per-job push feed: typed lifecycle events, a bounded best-effort queue
//! and heartbeat-aware subscriptions. Polling the job record stays the
//! source of truth; this crate never blocks a publisher.

pub mod bounded;
pub mod bus;
pub mod event;

pub use bounded::{BoundedEventFeed, FeedError};
pub use bus::{EventBus, FeedItem, Subscription};
pub use event::JobEvent;

/// Feed type used for job events.
pub type JobEventFeed = BoundedEventFeed<JobEvent>;
