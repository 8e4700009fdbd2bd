//! Runs one chunk against the completion service with retry and backoff.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use chunkflow_ai::{CompletionClient, CompletionError, CompletionRequest, sanitize_model_output};
use chunkflow_core::JobId;
use chunkflow_observability::MetricsSink;

use super::retry::{ErrorClass, RetryPolicy};
use super::types::{ChunkMetric, ChunkStatus};

/// Per-job call parameters shared by every chunk.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// `None` for the synchronous variant.
    pub job_id: Option<JobId>,
    pub system_prompt: String,
    pub model_id: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSuccess {
    pub output: String,
    pub metric: ChunkMetric,
}

/// Terminal failure of one chunk: retries exhausted or a fatal error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("chunk {chunk_index} failed after {attempts} attempt(s): {source}")]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub attempts: u32,
    pub class: ErrorClass,
    pub source: CompletionError,
    pub metric: ChunkMetric,
}

/// Chunk executor.
///
/// Retries stay inside [`ChunkExecutor::execute`]; callers only see the
/// terminal outcome.
pub struct ChunkExecutor {
    client: Arc<dyn CompletionClient>,
    metrics: Arc<dyn MetricsSink>,
    policy: RetryPolicy,
}

impl ChunkExecutor {
    pub fn new(client: Arc<dyn CompletionClient>, metrics: Arc<dyn MetricsSink>, policy: RetryPolicy) -> Self {
        Self {
            client,
            metrics,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `text` until it succeeds, fails fatally or runs out of attempts.
    pub fn execute(&self, chunk_index: usize, text: &str, ctx: &JobContext) -> Result<ChunkSuccess, ChunkFailure> {
        let request = CompletionRequest {
            system_prompt: &ctx.system_prompt,
            user_content: text,
            model_id: ctx.model_id.as_deref(),
            temperature: ctx.temperature,
            max_output_tokens: ctx.max_output_tokens,
        };
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let call_started = Instant::now();
            // A panicking client counts as a fatal failure of this attempt.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.client.complete(&request)))
                .unwrap_or_else(|_| Err(CompletionError::other("completion client panicked")));
            let call_duration = call_started.elapsed();

            let error = match outcome {
                Ok(raw) => {
                    let output = sanitize_model_output(&raw);
                    let metric = ChunkMetric {
                        chunk_index,
                        attempts: attempt,
                        status: ChunkStatus::Success,
                        call_duration_seconds: call_duration.as_secs_f64(),
                        total_duration_seconds: started.elapsed().as_secs_f64(),
                        error: None,
                        retryable: None,
                    };
                    self.persist("chunk_success", ctx, &metric, None, None);
                    debug!(job_id = ?ctx.job_id, chunk_index, attempt, "chunk succeeded");
                    return Ok(ChunkSuccess { output, metric });
                }
                Err(e) => e,
            };

            let class = self.policy.classify(&error);
            if self.policy.should_retry(class, attempt) {
                let delay = self.policy.delay_for_attempt(attempt, &mut rand::thread_rng());
                let metric = ChunkMetric {
                    chunk_index,
                    attempts: attempt,
                    status: ChunkStatus::Failed,
                    call_duration_seconds: call_duration.as_secs_f64(),
                    total_duration_seconds: started.elapsed().as_secs_f64(),
                    error: Some(error.to_string()),
                    retryable: Some(true),
                };
                self.persist("chunk_retry", ctx, &metric, error.status_code(), Some(delay));
                warn!(
                    job_id = ?ctx.job_id,
                    chunk_index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying chunk"
                );
                thread::sleep(delay);
                continue;
            }

            let metric = ChunkMetric {
                chunk_index,
                attempts: attempt,
                status: ChunkStatus::Failed,
                call_duration_seconds: call_duration.as_secs_f64(),
                total_duration_seconds: started.elapsed().as_secs_f64(),
                error: Some(error.to_string()),
                retryable: Some(class.is_retryable()),
            };
            self.persist("chunk_failed", ctx, &metric, error.status_code(), None);
            warn!(
                job_id = ?ctx.job_id,
                chunk_index,
                attempts = attempt,
                retryable = class.is_retryable(),
                error = %error,
                "chunk failed"
            );
            return Err(ChunkFailure {
                chunk_index,
                attempts: attempt,
                class,
                source: error,
                metric,
            });
        }
    }

    fn persist(
        &self,
        event: &str,
        ctx: &JobContext,
        metric: &ChunkMetric,
        status_code: Option<u16>,
        delay: Option<Duration>,
    ) {
        self.metrics.persist(
            event,
            json!({
                "job_id": ctx.job_id.map(|id| id.to_string()),
                "chunk_index": metric.chunk_index,
                "attempt": metric.attempts,
                "call_duration_seconds": metric.call_duration_seconds,
                "total_duration_seconds": metric.total_duration_seconds,
                "error": metric.error,
                "retryable": metric.retryable,
                "status_code": status_code,
                "delay_seconds": delay.map(|d| d.as_secs_f64()),
            }),
        );
    }
}
