use axum::{
    Router,
    routing::{get, post},
};

pub mod event_stream;
pub mod jobs;
pub mod system;

/// Router for the job endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::submit_job).get(jobs::list_jobs))
        .route("/jobs/sync", post(jobs::run_job_sync))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/events", get(event_stream::stream_job_events))
}
