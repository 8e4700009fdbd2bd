use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::dto::{SubmitJobRequest, SubmitJobResponse, SyncJobResponse};
use crate::app::errors;
use crate::app::services::AppServices;

/// POST /jobs
///
/// Chunk the text, register a job and start it in the background.
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<SubmitJobRequest>,
) -> axum::response::Response {
    if req.text.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "empty_input", "text must not be empty");
    }

    // Chunking with an exact tokenizer is CPU-bound; keep it off the runtime.
    let scheduler = services.scheduler.clone();
    let submitted = tokio::task::spawn_blocking(move || scheduler.submit(req.into_submission())).await;

    match submitted {
        Ok(Ok(job_id)) => (StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })).into_response(),
        Ok(Err(e)) => errors::scheduler_error_to_response(e),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
    }
}

/// POST /jobs/sync
///
/// Run the whole job and answer with its result.
pub async fn run_job_sync(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<SubmitJobRequest>,
) -> axum::response::Response {
    if req.text.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "empty_input", "text must not be empty");
    }

    let scheduler = services.scheduler.clone();
    let finished = tokio::task::spawn_blocking(move || scheduler.run_sync(req.into_submission())).await;

    match finished {
        Ok(Ok(result)) => Json(SyncJobResponse { result }).into_response(),
        Ok(Err(e)) => errors::job_failure_to_response(e),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
    }
}

/// GET /jobs/:id
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.scheduler.registry().snapshot(job_id) {
        Some(job) => Json(job).into_response(),
        None => errors::job_not_found(job_id),
    }
}

/// GET /jobs
pub async fn list_jobs(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.scheduler.registry().list())
}
