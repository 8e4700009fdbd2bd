use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use chunkflow_core::JobId;
use chunkflow_infra::{JobFailure, SchedulerError};

pub fn scheduler_error_to_response(err: SchedulerError) -> axum::response::Response {
    match err {
        SchedulerError::EmptyInput => json_error(StatusCode::BAD_REQUEST, "empty_input", err.to_string()),
        SchedulerError::Invalid(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        SchedulerError::Spawn(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
    }
}

pub fn job_failure_to_response(err: JobFailure) -> axum::response::Response {
    match err {
        JobFailure::Rejected(e) => scheduler_error_to_response(e),
        JobFailure::Failed(msg) => json_error(StatusCode::BAD_GATEWAY, "job_failed", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_job_id(s: &str) -> Result<JobId, axum::response::Response> {
    JobId::from_str(s).map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_job_id", e.to_string()))
}

pub fn job_not_found(id: JobId) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
}
