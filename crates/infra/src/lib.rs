//! Infrastructure layer: the job engine behind the HTTP surface.

pub mod jobs;

pub use jobs::{
    ChunkMetric, ChunkStatus, ErrorClass, Job, JobFailure, JobRegistry, JobScheduler, JobSubscription,
    RetryPolicy, SchedulerError, Submission,
};
