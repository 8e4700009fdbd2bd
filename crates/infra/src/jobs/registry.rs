//! In-memory job registry with a bounded event feed per job.

use std::collections::HashMap;
use std::sync::mpsc::TryRecvError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

use chunkflow_ai::Mode;
use chunkflow_core::JobId;
use chunkflow_events::{EventBus, FeedError, FeedItem, JobEvent, JobEventFeed, Subscription};

use super::types::{ChunkMetric, Job, JobOutcome};

struct JobEntry {
    /// Insertion order, for stable listing.
    seq: u64,
    job: Job,
    feed: Arc<JobEventFeed>,
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<JobId, JobEntry>,
    next_seq: u64,
}

/// Concurrent-safe map of job records.
///
/// One lock guards the map and every record in it. Feed publishes happen
/// under that lock too, so event order matches record updates. Records are
/// kept for the life of the process.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Mutex<RegistryState>>,
    event_capacity: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.len())
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

impl JobRegistry {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryState::default())),
            event_capacity: event_capacity.max(1),
        }
    }

    // A panicking writer cannot leave a record half-updated in a way later
    // readers care about, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a pending job.
    pub fn create(&self, mode: Mode, target_language: Option<String>, chunks_total: usize) -> JobId {
        let id = JobId::new();
        let mut state = self.lock();
        let entry = JobEntry {
            seq: state.next_seq,
            job: Job::new(id, mode, target_language, chunks_total),
            feed: Arc::new(JobEventFeed::new(self.event_capacity)),
        };
        state.next_seq += 1;
        state.jobs.insert(id, entry);
        drop(state);
        debug!(job_id = %id, chunks_total, "job created");
        id
    }

    /// Point-in-time copy of a job record.
    pub fn snapshot(&self, id: JobId) -> Option<Job> {
        self.lock().jobs.get(&id).map(|entry| entry.job.clone())
    }

    /// All jobs, in submission order.
    pub fn list(&self) -> Vec<Job> {
        let state = self.lock();
        let mut entries: Vec<&JobEntry> = state.jobs.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.job.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live feed for `id`, or `None` if the job does not exist.
    pub fn subscribe(&self, id: JobId) -> Option<JobSubscription> {
        let state = self.lock();
        let entry = state.jobs.get(&id)?;
        Some(JobSubscription {
            job_id: id,
            inner: entry.feed.subscribe(),
            registry: self.clone(),
            finished: false,
        })
    }

    pub(crate) fn mark_running(&self, id: JobId) {
        self.update(id, |job| {
            job.mark_running().then(|| JobEvent::Started {
                job_id: id,
                chunks_total: job.chunks_total,
            })
        });
    }

    pub(crate) fn record_success(&self, id: JobId, metric: ChunkMetric) {
        self.update(id, |job| {
            if job.status.is_terminal() {
                return None;
            }
            let chunk_index = metric.chunk_index;
            job.record_success(metric);
            Some(JobEvent::Progress {
                job_id: id,
                chunk_index,
                chunks_completed: job.chunks_completed,
                chunks_total: job.chunks_total,
                progress_percent: job.progress_percent,
            })
        });
    }

    pub(crate) fn record_failure(&self, id: JobId, metric: ChunkMetric, error: &str, retryable: bool) {
        self.update(id, |job| {
            if job.status.is_terminal() {
                return None;
            }
            let chunk_index = metric.chunk_index;
            job.record_failure(metric, error);
            Some(JobEvent::Error {
                job_id: id,
                chunk_index,
                error: error.to_string(),
                retryable,
            })
        });
    }

    pub(crate) fn finish(&self, id: JobId, outcome: &JobOutcome) {
        self.update(id, |job| job.finish(outcome).then(|| final_event(job)));
    }

    fn update<F>(&self, id: JobId, apply: F)
    where
        F: FnOnce(&mut Job) -> Option<JobEvent>,
    {
        let mut state = self.lock();
        let Some(entry) = state.jobs.get_mut(&id) else {
            warn!(job_id = %id, "update for unknown job ignored");
            return;
        };
        if let Some(event) = apply(&mut entry.job) {
            publish(&entry.feed, event);
        }
    }
}

fn publish(feed: &JobEventFeed, event: JobEvent) {
    match feed.publish(event) {
        Ok(()) => {}
        Err(FeedError::Full) => {
            debug!(dropped = feed.dropped(), "event queue full; event dropped")
        }
        // Subscriptions hold the receiver; with none alive the feed itself
        // still owns it, so this only happens during teardown.
        Err(FeedError::Disconnected) => {}
    }
}

fn final_event(job: &Job) -> JobEvent {
    JobEvent::Final {
        job_id: job.id,
        status: job.status,
        error: job.error.clone(),
        chunks_completed: job.chunks_completed,
        chunks_failed: job.chunks_failed,
    }
}

/// Consumer side of one job's feed.
///
/// Ends after a `final` event. When the queue is drained and the job is
/// already terminal (its `final` was dropped or taken by another consumer)
/// the `final` event is rebuilt from the record.
pub struct JobSubscription {
    job_id: JobId,
    inner: Subscription<JobEvent>,
    registry: JobRegistry,
    finished: bool,
}

impl JobSubscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event, a `Ping` after `heartbeat` of silence, or `Closed`.
    pub fn next_item(&mut self, heartbeat: Duration) -> FeedItem<JobEvent> {
        if self.finished {
            return FeedItem::Closed;
        }

        let item = match self.inner.try_recv() {
            Ok(event) => FeedItem::Event(event),
            Err(TryRecvError::Disconnected) => FeedItem::Closed,
            Err(TryRecvError::Empty) => match self.from_record() {
                Some(item) => item,
                None => match self.inner.next(heartbeat) {
                    FeedItem::Ping => self.from_record().unwrap_or(FeedItem::Ping),
                    other => other,
                },
            },
        };

        if matches!(&item, FeedItem::Closed) || matches!(&item, FeedItem::Event(e) if e.is_final()) {
            self.finished = true;
        }
        item
    }

    /// `Closed` for a missing job, a rebuilt `final` for a terminal one.
    fn from_record(&self) -> Option<FeedItem<JobEvent>> {
        match self.registry.snapshot(self.job_id) {
            None => Some(FeedItem::Closed),
            Some(job) if job.status.is_terminal() => Some(FeedItem::Event(final_event(&job))),
            Some(_) => None,
        }
    }
}

impl Iterator for JobSubscription {
    type Item = JobEvent;

    /// Blocks until the next event; pings are skipped.
    fn next(&mut self) -> Option<JobEvent> {
        loop {
            match self.next_item(Duration::from_secs(1)) {
                FeedItem::Event(event) => return Some(event),
                FeedItem::Ping => continue,
                FeedItem::Closed => return None,
            }
        }
    }
}
