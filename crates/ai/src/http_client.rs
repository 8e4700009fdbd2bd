//! Blocking HTTP client for Azure-OpenAI-style chat completions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use chunkflow_core::CoreError;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};

/// Longest error body kept in a `CompletionError::Status` message.
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCompletionConfig {
    /// e.g. `https://<resource>.openai.azure.com/`
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    /// Default deployment when a request carries no model id.
    pub deployment: Option<String>,
    pub timeout: Duration,
}

impl HttpCompletionConfig {
    /// Read `AZURE_OPENAI_*` and `AOAI_HTTP_TIMEOUT` from the environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let endpoint = get("AZURE_OPENAI_ENDPOINT")
            .ok_or_else(|| CoreError::config("AZURE_OPENAI_ENDPOINT", "missing"))?;
        let api_key = get("AZURE_OPENAI_API_KEY")
            .ok_or_else(|| CoreError::config("AZURE_OPENAI_API_KEY", "missing"))?;
        let timeout = match get("AOAI_HTTP_TIMEOUT") {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|t| *t > 0.0)
                .and_then(|t| Duration::try_from_secs_f64(t).ok())
                .ok_or_else(|| CoreError::config("AOAI_HTTP_TIMEOUT", format!("{raw:?} is not a positive number")))?,
            None => Duration::from_secs(60),
        };

        Ok(Self {
            endpoint,
            api_key,
            api_version: get("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| "2024-06-01".to_string()),
            deployment: get("AZURE_OPENAI_DEPLOYMENT"),
            timeout,
        })
    }

    fn url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            deployment,
            self.api_version
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client over blocking `reqwest`.
///
/// Must be built and used off the async runtime (the engine's worker
/// threads do that).
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    http: reqwest::blocking::Client,
    config: HttpCompletionConfig,
}

impl HttpCompletionClient {
    pub fn new(config: HttpCompletionConfig) -> Result<Self, CompletionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::other(format!("failed to build http client: {e}")))?;
        Ok(Self { http, config })
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        let deployment = request
            .model_id
            .or(self.config.deployment.as_deref())
            .ok_or_else(|| CompletionError::other("missing deployment name; set AZURE_OPENAI_DEPLOYMENT"))?;

        let body = ChatCompletionBody {
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: request.user_content,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        let response = self
            .http
            .post(self.config.url(deployment))
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                let error = map_transport_error(e);
                debug!(deployment, error = %error, "completion request failed");
                error
            })?;

        let status = response.status();
        if !status.is_success() {
            let message: String = response
                .text()
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            debug!(deployment, status = status.as_u16(), "completion request rejected");
            return Err(CompletionError::status(status.as_u16(), message));
        }

        let parsed: ChatCompletionResponse = response.json().map_err(map_transport_error)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(CompletionError::EmptyResponse)
    }
}

fn map_transport_error(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout(e.to_string())
    } else if let Some(status) = e.status() {
        CompletionError::status(status.as_u16(), e.to_string())
    } else {
        CompletionError::Transport(e.to_string())
    }
}
