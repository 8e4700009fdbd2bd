//! In-process completion clients for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};

/// Client whose answers are scripted per user content.
///
/// - Each content has a queue of outcomes consumed one call at a time.
/// - Once a queue is empty (or for unscripted content) the content is
///   echoed back unchanged.
#[derive(Debug, Default)]
pub struct ScriptedCompletionClient {
    plans: Mutex<HashMap<String, VecDeque<Result<String, CompletionError>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for calls whose user content equals `content`.
    pub fn script<I>(self, content: impl Into<String>, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<String, CompletionError>>,
    {
        if let Ok(mut plans) = self.plans.lock() {
            plans.entry(content.into()).or_default().extend(outcomes);
        }
        self
    }

    /// User contents of every call, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, content: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == content).count()
    }
}

impl CompletionClient for ScriptedCompletionClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.user_content.to_string());
        }

        let planned = self
            .plans
            .lock()
            .map_err(|_| CompletionError::other("scripted client lock poisoned"))?
            .get_mut(request.user_content)
            .and_then(VecDeque::pop_front);

        planned.unwrap_or_else(|| Ok(request.user_content.to_string()))
    }
}

/// Client backed by a closure.
pub struct FnCompletionClient<F> {
    f: F,
}

impl<F> FnCompletionClient<F>
where
    F: Fn(&CompletionRequest<'_>) -> Result<String, CompletionError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> CompletionClient for FnCompletionClient<F>
where
    F: Fn(&CompletionRequest<'_>) -> Result<String, CompletionError> + Send + Sync,
{
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        (self.f)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> CompletionRequest<'_> {
        CompletionRequest {
            system_prompt: "sys",
            user_content: content,
            model_id: None,
            temperature: 0.2,
            max_output_tokens: 64,
        }
    }

    #[test]
    fn scripted_outcomes_are_consumed_in_order() {
        let client = ScriptedCompletionClient::new().script(
            "a",
            [Err(CompletionError::status(429, "busy")), Ok("A".to_string())],
        );

        assert_eq!(client.complete(&request("a")).unwrap_err().status_code(), Some(429));
        assert_eq!(client.complete(&request("a")).unwrap(), "A");
        assert_eq!(client.complete(&request("a")).unwrap(), "a");
        assert_eq!(client.complete(&request("b")).unwrap(), "b");
        assert_eq!(client.calls_for("a"), 3);
    }

    #[test]
    fn fn_client_delegates() {
        let client = FnCompletionClient::new(|req: &CompletionRequest<'_>| Ok(req.user_content.to_uppercase()));
        assert_eq!(client.complete(&request("hi")).unwrap(), "HI");
    }
}
