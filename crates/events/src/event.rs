//! Job lifecycle events pushed to live subscribers.

use serde::{Deserialize, Serialize};

use chunkflow_core::{JobId, JobStatus};

/// One message on a job's feed.
///
/// Order per job: `started`, then any mix of `progress`/`error`, then
/// exactly one `final`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: JobId,
        chunks_total: usize,
    },
    Progress {
        job_id: JobId,
        chunk_index: usize,
        chunks_completed: usize,
        chunks_total: usize,
        progress_percent: u8,
    },
    Error {
        job_id: JobId,
        chunk_index: usize,
        error: String,
        retryable: bool,
    },
    Final {
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
        chunks_completed: usize,
        chunks_failed: usize,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Error { job_id, .. }
            | JobEvent::Final { job_id, .. } => *job_id,
        }
    }

    /// Wire name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Started { .. } => "started",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Error { .. } => "error",
            JobEvent::Final { .. } => "final",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, JobEvent::Final { .. })
    }
}
