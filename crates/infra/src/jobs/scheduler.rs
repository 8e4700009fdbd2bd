//! Job scheduler: bounded worker pool, circuit breaker, ordered assembly.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use chunkflow_ai::{CompletionClient, PromptContext};
use chunkflow_chunker::{Chunk, Chunker};
use chunkflow_core::{CoreError, EngineConfig, JobId};
use chunkflow_observability::MetricsSink;

use super::executor::{ChunkExecutor, ChunkFailure, ChunkSuccess, JobContext};
use super::registry::JobRegistry;
use super::retry::RetryPolicy;
use super::types::{ChunkMetric, JobOutcome};

/// Separator placed between chunk outputs in the assembled result.
pub const RESULT_SEPARATOR: &str = "\n";

/// Text plus the prompt settings it should be processed with.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub text: String,
    pub prompt: PromptContext,
}

impl Submission {
    pub fn new(text: impl Into<String>, prompt: PromptContext) -> Self {
        Self {
            text: text.into(),
            prompt,
        }
    }

    pub fn grammar(text: impl Into<String>) -> Self {
        Self::new(text, PromptContext::grammar())
    }
}

/// Rejected before any job ran.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("input text is empty")]
    EmptyInput,

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("failed to start job thread: {0}")]
    Spawn(String),
}

/// Why a synchronous run produced no result.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error(transparent)]
    Rejected(#[from] SchedulerError),

    #[error("{0}")]
    Failed(String),
}

/// Receives job progress from the scheduler thread.
trait JobObserver {
    fn started(&self, _chunks_total: usize) {}
    fn chunk_succeeded(&self, _metric: ChunkMetric) {}
    fn chunk_failed(&self, _metric: ChunkMetric, _error: &str, _retryable: bool) {}
    fn finished(&self, _outcome: &JobOutcome) {}
}

/// Synchronous runs keep no record.
struct Detached;

impl JobObserver for Detached {}

struct Tracked<'r> {
    registry: &'r JobRegistry,
    job_id: JobId,
}

impl JobObserver for Tracked<'_> {
    fn started(&self, _chunks_total: usize) {
        self.registry.mark_running(self.job_id);
    }

    fn chunk_succeeded(&self, metric: ChunkMetric) {
        self.registry.record_success(self.job_id, metric);
    }

    fn chunk_failed(&self, metric: ChunkMetric, error: &str, retryable: bool) {
        self.registry.record_failure(self.job_id, metric, error, retryable);
    }

    fn finished(&self, outcome: &JobOutcome) {
        self.registry.finish(self.job_id, outcome);
    }
}

/// Result slots and failure bookkeeping, owned by the scheduler thread.
struct Assembly {
    results: Vec<Option<String>>,
    completed: usize,
    failed: usize,
    consecutive_failures: u32,
    first_error: Option<String>,
    breaker: Option<String>,
}

impl Assembly {
    fn new(total: usize) -> Self {
        Self {
            results: vec![None; total],
            completed: 0,
            failed: 0,
            consecutive_failures: 0,
            first_error: None,
            breaker: None,
        }
    }

    fn apply(&mut self, outcome: Result<ChunkSuccess, ChunkFailure>, observer: &dyn JobObserver) {
        match outcome {
            Ok(success) => {
                if let Some(slot) = self.results.get_mut(success.metric.chunk_index) {
                    if slot.is_none() {
                        *slot = Some(success.output);
                        self.completed += 1;
                    }
                }
                self.consecutive_failures = 0;
                observer.chunk_succeeded(success.metric);
            }
            Err(failure) => {
                self.failed += 1;
                self.consecutive_failures += 1;
                let message = failure.to_string();
                if self.first_error.is_none() {
                    self.first_error = Some(message.clone());
                }
                observer.chunk_failed(failure.metric, &message, failure.class.is_retryable());
            }
        }
    }

    fn trip(&mut self) {
        self.breaker = Some(format!(
            "aborted after {} consecutive failures",
            self.consecutive_failures
        ));
    }

    fn into_outcome(self) -> JobOutcome {
        if let Some(message) = self.breaker.or(self.first_error) {
            return JobOutcome::Failed(message);
        }
        match self.results.into_iter().collect::<Option<Vec<String>>>() {
            Some(parts) => JobOutcome::Succeeded(parts.join(RESULT_SEPARATOR)),
            None => JobOutcome::Failed("job finished with missing chunk results".to_string()),
        }
    }
}

/// Splits submissions into chunks and runs them through the executor.
///
/// Cheap to clone; clones share the registry and executor.
#[derive(Clone)]
pub struct JobScheduler {
    config: Arc<EngineConfig>,
    chunker: Chunker,
    executor: Arc<ChunkExecutor>,
    metrics: Arc<dyn MetricsSink>,
    registry: JobRegistry,
}

impl JobScheduler {
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn CompletionClient>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let executor = ChunkExecutor::new(client, metrics.clone(), RetryPolicy::from_config(&config));
        Ok(Self {
            chunker: Chunker::for_encoding(config.max_input_tokens, &config.encoding_name),
            registry: JobRegistry::new(config.event_queue_capacity),
            executor: Arc::new(executor),
            metrics,
            config: Arc::new(config),
        })
    }

    /// Replace the chunker built from the configured encoding.
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a job and run it on a background thread.
    pub fn submit(&self, submission: Submission) -> Result<JobId, SchedulerError> {
        let chunks = self.prepare(&submission)?;
        let chunks_total = chunks.len();
        let job_id = self.registry.create(
            submission.prompt.mode,
            submission.prompt.target_language.clone(),
            chunks_total,
        );
        let ctx = self.context(Some(job_id), &submission.prompt);

        let scheduler = self.clone();
        let spawned = thread::Builder::new()
            .name("chunkflow-job".to_string())
            .spawn(move || {
                let observer = Tracked {
                    registry: &scheduler.registry,
                    job_id,
                };
                scheduler.run(chunks, ctx, &observer);
            });

        if let Err(e) = spawned {
            let message = format!("failed to start job thread: {e}");
            self.registry.mark_running(job_id);
            self.registry.finish(job_id, &JobOutcome::Failed(message));
            return Err(SchedulerError::Spawn(e.to_string()));
        }

        info!(job_id = %job_id, chunks_total, mode = %submission.prompt.mode, "job submitted");
        Ok(job_id)
    }

    /// Run a submission to completion on the calling thread.
    pub fn run_sync(&self, submission: Submission) -> Result<String, JobFailure> {
        let chunks = self.prepare(&submission)?;
        let ctx = self.context(None, &submission.prompt);
        match self.run(chunks, ctx, &Detached) {
            JobOutcome::Succeeded(result) => Ok(result),
            JobOutcome::Failed(error) => Err(JobFailure::Failed(error)),
        }
    }

    fn prepare(&self, submission: &Submission) -> Result<Vec<Chunk>, SchedulerError> {
        submission.prompt.validate()?;
        let chunks = self.chunker.chunks(&submission.text);
        if chunks.is_empty() {
            return Err(SchedulerError::EmptyInput);
        }
        Ok(chunks)
    }

    fn context(&self, job_id: Option<JobId>, prompt: &PromptContext) -> JobContext {
        JobContext {
            job_id,
            system_prompt: prompt.system_prompt(),
            model_id: self.config.model_id.clone(),
            temperature: self.config.temperature,
            max_output_tokens: self.config.max_output_tokens,
        }
    }

    fn run(&self, chunks: Vec<Chunk>, ctx: JobContext, observer: &dyn JobObserver) -> JobOutcome {
        let started = Instant::now();
        observer.started(chunks.len());

        let workers = self.config.max_parallel_requests.min(chunks.len());
        if workers <= 1 {
            self.run_sequential(&chunks, &ctx, observer, started)
        } else {
            self.run_parallel(chunks.into(), Arc::new(ctx), observer, workers, started)
        }
    }

    /// One chunk at a time; the first terminal failure ends the job.
    fn run_sequential(
        &self,
        chunks: &[Chunk],
        ctx: &JobContext,
        observer: &dyn JobObserver,
        started: Instant,
    ) -> JobOutcome {
        let mut assembly = Assembly::new(chunks.len());
        for chunk in chunks {
            let outcome = self.executor.execute(chunk.index, &chunk.text, ctx);
            let failed = outcome.is_err();
            assembly.apply(outcome, observer);
            if failed {
                break;
            }
        }
        self.finalize(assembly, ctx, observer, chunks.len(), started)
    }

    /// `workers` detached threads pull chunk indices from a shared queue and
    /// post outcomes back; only this thread touches the assembly. Workers are
    /// not joined, so a tripped breaker returns without waiting on chunks
    /// still in flight.
    fn run_parallel(
        &self,
        chunks: Arc<[Chunk]>,
        ctx: Arc<JobContext>,
        observer: &dyn JobObserver,
        workers: usize,
        started: Instant,
    ) -> JobOutcome {
        let (work_tx, work_rx) = mpsc::channel::<usize>();
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (done_tx, done_rx) = mpsc::channel();

        let mut spawned = 0;
        for worker in 0..workers {
            let executor = Arc::clone(&self.executor);
            let worker_chunks = Arc::clone(&chunks);
            let worker_ctx = Arc::clone(&ctx);
            let work_rx = Arc::clone(&work_rx);
            let done_tx = done_tx.clone();
            let result = thread::Builder::new()
                .name(format!("chunkflow-worker-{worker}"))
                .spawn(move || {
                    loop {
                        let next = match work_rx.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => break,
                        };
                        let Ok(index) = next else { break };
                        let chunk = &worker_chunks[index];
                        let outcome = executor.execute(chunk.index, &chunk.text, &worker_ctx);
                        // Receiver gone: the job was finalized early.
                        if done_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            match result {
                Ok(_) => spawned += 1,
                Err(e) => warn!(job_id = ?ctx.job_id, worker, error = %e, "failed to start worker thread"),
            }
        }
        drop(done_tx);

        if spawned == 0 {
            return self.run_sequential(&chunks, &ctx, observer, started);
        }
        self.dispatch(chunks.len(), spawned, work_tx, done_rx, &ctx, observer, started)
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        total: usize,
        workers: usize,
        work_tx: Sender<usize>,
        done_rx: Receiver<Result<ChunkSuccess, ChunkFailure>>,
        ctx: &JobContext,
        observer: &dyn JobObserver,
        started: Instant,
    ) -> JobOutcome {
        let threshold = self.config.circuit_breaker_failure_threshold;
        let mut assembly = Assembly::new(total);
        let mut next_index = 0;
        let mut in_flight = 0;

        // Indices go out in order; a new one only when a slot frees up.
        while next_index < workers.min(total) && work_tx.send(next_index).is_ok() {
            next_index += 1;
            in_flight += 1;
        }

        while in_flight > 0 {
            let Ok(outcome) = done_rx.recv() else { break };
            in_flight -= 1;
            assembly.apply(outcome, observer);

            if assembly.consecutive_failures >= threshold {
                assembly.trip();
                warn!(
                    job_id = ?ctx.job_id,
                    consecutive_failures = assembly.consecutive_failures,
                    dispatched = next_index,
                    total,
                    in_flight,
                    "circuit breaker tripped"
                );
                break;
            }

            if next_index < total && work_tx.send(next_index).is_ok() {
                next_index += 1;
                in_flight += 1;
            }
        }

        // Stop idle workers and make in-flight results undeliverable.
        drop(work_tx);
        drop(done_rx);

        self.finalize(assembly, ctx, observer, total, started)
    }

    fn finalize(
        &self,
        assembly: Assembly,
        ctx: &JobContext,
        observer: &dyn JobObserver,
        total: usize,
        started: Instant,
    ) -> JobOutcome {
        let (completed, failed) = (assembly.completed, assembly.failed);
        let outcome = assembly.into_outcome();
        observer.finished(&outcome);

        let error = match &outcome {
            JobOutcome::Succeeded(_) => None,
            JobOutcome::Failed(e) => Some(e.as_str()),
        };
        self.metrics.persist(
            "job_finished",
            json!({
                "job_id": ctx.job_id.map(|id| id.to_string()),
                "status": outcome.status().as_str(),
                "chunks_total": total,
                "chunks_completed": completed,
                "chunks_failed": failed,
                "duration_seconds": started.elapsed().as_secs_f64(),
                "error": error,
            }),
        );

        match &outcome {
            JobOutcome::Succeeded(result) => info!(
                job_id = ?ctx.job_id,
                chunks_total = total,
                result_chars = result.chars().count(),
                "job succeeded"
            ),
            JobOutcome::Failed(error) => warn!(
                job_id = ?ctx.job_id,
                chunks_total = total,
                chunks_completed = completed,
                chunks_failed = failed,
                error = %error,
                "job failed"
            ),
        }
        outcome
    }
}
