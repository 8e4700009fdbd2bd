use serde::{Deserialize, Serialize};

use chunkflow_ai::{Mode, PromptContext};
use chunkflow_core::JobId;
use chunkflow_infra::Submission;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub text: String,
    #[serde(default)]
    pub mode: Mode,
    pub target_language: Option<String>,
    pub source_language: Option<String>,
}

impl SubmitJobRequest {
    pub fn into_submission(self) -> Submission {
        let prompt = PromptContext {
            mode: self.mode,
            source_language: self.source_language,
            target_language: self.target_language,
        };
        Submission::new(self.text, prompt)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct SyncJobResponse {
    pub result: String,
}
