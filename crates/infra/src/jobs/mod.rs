//! Chunked job engine.
//!
//! ## Components
//!
//! - `RetryPolicy`: classifies remote failures and computes backoff
//! - `ChunkExecutor`: one chunk, retries included, sanitized output
//! - `JobScheduler`: worker pool, circuit breaker, ordered assembly
//! - `JobRegistry`: job records, snapshots and live event feeds

pub mod executor;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod types;

pub use executor::{ChunkExecutor, ChunkFailure, ChunkSuccess, JobContext};
pub use registry::{JobRegistry, JobSubscription};
pub use retry::{ErrorClass, RetryPolicy, classify};
pub use scheduler::{JobFailure, JobScheduler, RESULT_SEPARATOR, SchedulerError, Submission};
pub use types::{ChunkMetric, ChunkStatus, Job, JobOutcome};
