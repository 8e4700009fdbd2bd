//! Job record and per-chunk metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chunkflow_ai::Mode;
use chunkflow_core::{JobId, JobStatus};

/// Outcome of one chunk after all of its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Success,
    Failed,
}

/// Per-chunk execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetric {
    pub chunk_index: usize,
    /// Remote calls made, including the first (≥ 1).
    pub attempts: u32,
    pub status: ChunkStatus,
    /// Duration of the last remote call.
    pub call_duration_seconds: f64,
    /// Wall time across all attempts and backoff sleeps.
    pub total_duration_seconds: f64,
    pub error: Option<String>,
    /// Set on failure: whether the last error was transient.
    pub retryable: Option<bool>,
}

/// Terminal result of a job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded(String),
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded(_) => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }
}

/// Externally visible job state; registry snapshots are clones of this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub mode: Mode,
    pub target_language: Option<String>,
    pub chunks_total: usize,
    pub chunks_completed: usize,
    pub chunks_failed: usize,
    pub progress_percent: u8,
    /// Present only once succeeded.
    pub result: Option<String>,
    /// Present only once failed.
    pub error: Option<String>,
    pub metrics: Vec<ChunkMetric>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, mode: Mode, target_language: Option<String>, chunks_total: usize) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            mode,
            target_language,
            chunks_total,
            chunks_completed: 0,
            chunks_failed: 0,
            progress_percent: 0,
            result: None,
            error: None,
            metrics: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// `pending → running`. Returns false if the job was not pending.
    pub fn mark_running(&mut self) -> bool {
        if !self.status.can_transition_to(JobStatus::Running) {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    pub fn record_success(&mut self, metric: ChunkMetric) {
        if self.status.is_terminal() {
            return;
        }
        self.chunks_completed += 1;
        self.progress_percent = percent(self.chunks_completed, self.chunks_total);
        self.push_metric(metric);
    }

    /// Count a failed chunk; the first failure message is kept.
    pub fn record_failure(&mut self, metric: ChunkMetric, error: &str) {
        if self.status.is_terminal() {
            return;
        }
        self.chunks_failed += 1;
        if self.error.is_none() {
            self.error = Some(error.to_string());
        }
        self.push_metric(metric);
    }

    /// `running → succeeded | failed`. Returns false if already terminal or
    /// never started.
    pub fn finish(&mut self, outcome: &JobOutcome) -> bool {
        let next = outcome.status();
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        match outcome {
            JobOutcome::Succeeded(result) => {
                self.result = Some(result.clone());
                self.error = None;
            }
            JobOutcome::Failed(error) => {
                self.result = None;
                self.error = Some(error.clone());
            }
        }
        self.finished_at = Some(Utc::now());
        true
    }

    fn push_metric(&mut self, metric: ChunkMetric) {
        if self.metrics.len() < self.chunks_total {
            self.metrics.push(metric);
        }
    }
}

/// `100 * completed / total`, integer, 0 when there is nothing to do.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (completed.min(total) * 100 / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(index: usize, status: ChunkStatus) -> ChunkMetric {
        ChunkMetric {
            chunk_index: index,
            attempts: 1,
            status,
            call_duration_seconds: 0.0,
            total_duration_seconds: 0.0,
            error: None,
            retryable: None,
        }
    }

    fn running_job(total: usize) -> Job {
        let mut job = Job::new(JobId::new(), Mode::Grammar, None, total);
        assert!(job.mark_running());
        job
    }

    #[test]
    fn progress_is_recomputed_on_each_success() {
        let mut job = running_job(3);
        job.record_success(metric(0, ChunkStatus::Success));
        assert_eq!(job.progress_percent, 33);
        job.record_success(metric(2, ChunkStatus::Success));
        assert_eq!(job.progress_percent, 66);
        job.record_success(metric(1, ChunkStatus::Success));
        assert_eq!(job.progress_percent, 100);
        assert_eq!(job.metrics.len(), 3);
    }

    #[test]
    fn first_failure_is_latched() {
        let mut job = running_job(3);
        job.record_failure(metric(1, ChunkStatus::Failed), "first");
        job.record_failure(metric(2, ChunkStatus::Failed), "second");
        assert_eq!(job.error.as_deref(), Some("first"));
        assert_eq!(job.chunks_failed, 2);
    }

    #[test]
    fn finish_is_one_shot() {
        let mut job = running_job(1);
        assert!(job.finish(&JobOutcome::Failed("aborted after 1 consecutive failures".into())));
        assert!(!job.finish(&JobOutcome::Succeeded("late".into())));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());

        job.record_success(metric(0, ChunkStatus::Success));
        assert_eq!(job.chunks_completed, 0);
    }

    #[test]
    fn pending_job_cannot_finish() {
        let mut job = Job::new(JobId::new(), Mode::Grammar, None, 1);
        assert!(!job.finish(&JobOutcome::Succeeded("x".into())));
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn metrics_never_exceed_chunk_count() {
        let mut job = running_job(1);
        job.record_success(metric(0, ChunkStatus::Success));
        job.record_failure(metric(0, ChunkStatus::Failed), "dup");
        assert_eq!(job.metrics.len(), 1);
    }

    #[test]
    fn snapshot_serializes_snake_case() {
        let job = running_job(2);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["chunks_total"], 2);
        assert_eq!(json["progress_percent"], 0);
        assert_eq!(json["mode"], "grammar");
        assert!(json["result"].is_null());
    }
}
