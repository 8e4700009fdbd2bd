use std::sync::Arc;

use thiserror::Error;

/// One chat-completion call: a system prompt plus the chunk text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_content: &'a str,
    /// Deployment/model; `None` lets the client use its own default.
    pub model_id: Option<&'a str>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// The service answered with a non-success status.
    #[error("remote service returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// No answer within the client timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection or protocol failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered without any choices.
    #[error("no choices returned from remote service")]
    EmptyResponse,

    /// Anything else (misconfiguration, unexpected payloads).
    #[error("{0}")]
    Other(String),
}

impl CompletionError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Numeric status code, when the failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CompletionError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Remote text-completion service.
///
/// Calls block the current thread; the engine runs them on its own worker
/// threads.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError>;
}

impl<C> CompletionClient for Arc<C>
where
    C: CompletionClient + ?Sized,
{
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        (**self).complete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_only_for_status_errors() {
        assert_eq!(CompletionError::status(429, "slow down").status_code(), Some(429));
        assert_eq!(CompletionError::Timeout("60s".into()).status_code(), None);
        assert_eq!(CompletionError::EmptyResponse.status_code(), None);
    }

    #[test]
    fn display_includes_status_and_message() {
        let err = CompletionError::status(503, "overloaded");
        assert_eq!(err.to_string(), "remote service returned status 503: overloaded");
    }
}
