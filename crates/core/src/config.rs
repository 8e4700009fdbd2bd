//! Engine configuration loaded from environment variables.

use std::time::Duration;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// Tunables for chunking, remote calls, retries and the circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Token budget per chunk.
    pub max_input_tokens: usize,
    /// Tokenizer encoding used for exact token counts.
    pub encoding_name: String,
    /// Upper bound on concurrently executing chunks per job.
    pub max_parallel_requests: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Total attempts per chunk, including the first call.
    pub retry_max_attempts: u32,
    pub retry_base_delay_seconds: f64,
    pub retry_backoff_factor: f64,
    pub retry_jitter_seconds: f64,
    pub retryable_status_codes: Vec<u16>,
    /// Consecutive chunk failures that abort a job.
    pub circuit_breaker_failure_threshold: u32,
    /// Deployment/model passed to the remote service.
    pub model_id: Option<String>,
    /// Capacity of each job's push-event queue.
    pub event_queue_capacity: usize,
    pub heartbeat_interval_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 12_000,
            encoding_name: "o200k_base".to_string(),
            max_parallel_requests: 4,
            temperature: 0.2,
            max_output_tokens: 2048,
            retry_max_attempts: 3,
            retry_base_delay_seconds: 1.0,
            retry_backoff_factor: 2.0,
            retry_jitter_seconds: 0.25,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
            circuit_breaker_failure_threshold: 3,
            model_id: None,
            event_queue_capacity: 100,
            heartbeat_interval_seconds: 15.0,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            max_input_tokens: parse_or(&get, "MAX_INPUT_TOKENS", defaults.max_input_tokens)?,
            encoding_name: get("TIKTOKEN_ENCODING").unwrap_or(defaults.encoding_name),
            max_parallel_requests: parse_or(&get, "MAX_PARALLEL_REQUESTS", defaults.max_parallel_requests)?,
            temperature: parse_or(&get, "AOAI_TEMPERATURE", defaults.temperature)?,
            max_output_tokens: parse_or(&get, "MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            retry_max_attempts: parse_or(&get, "RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?,
            retry_base_delay_seconds: parse_or(
                &get,
                "RETRY_BASE_DELAY_SECONDS",
                defaults.retry_base_delay_seconds,
            )?,
            retry_backoff_factor: parse_or(&get, "RETRY_BACKOFF_FACTOR", defaults.retry_backoff_factor)?,
            retry_jitter_seconds: parse_or(&get, "RETRY_JITTER_SECONDS", defaults.retry_jitter_seconds)?,
            retryable_status_codes: match get("RETRYABLE_STATUS_CODES") {
                Some(raw) => parse_status_codes(&raw)?,
                None => defaults.retryable_status_codes,
            },
            circuit_breaker_failure_threshold: parse_or(
                &get,
                "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                defaults.circuit_breaker_failure_threshold,
            )?,
            model_id: get("AZURE_OPENAI_DEPLOYMENT"),
            event_queue_capacity: parse_or(&get, "EVENT_QUEUE_CAPACITY", defaults.event_queue_capacity)?,
            heartbeat_interval_seconds: parse_or(
                &get,
                "EVENT_HEARTBEAT_SECONDS",
                defaults.heartbeat_interval_seconds,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_input_tokens == 0 {
            return Err(CoreError::config("MAX_INPUT_TOKENS", "must be at least 1"));
        }
        if self.max_parallel_requests == 0 {
            return Err(CoreError::config("MAX_PARALLEL_REQUESTS", "must be at least 1"));
        }
        if self.retry_max_attempts == 0 {
            return Err(CoreError::config("RETRY_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.circuit_breaker_failure_threshold == 0 {
            return Err(CoreError::config(
                "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                "must be at least 1",
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(CoreError::config("EVENT_QUEUE_CAPACITY", "must be at least 1"));
        }
        if !(self.retry_backoff_factor.is_finite() && self.retry_backoff_factor >= 0.0) {
            return Err(CoreError::config(
                "RETRY_BACKOFF_FACTOR",
                "must be a finite non-negative number",
            ));
        }
        // These become `Duration`s, which reject negative and huge values.
        for (key, value) in [
            ("RETRY_BASE_DELAY_SECONDS", self.retry_base_delay_seconds),
            ("RETRY_JITTER_SECONDS", self.retry_jitter_seconds),
            ("EVENT_HEARTBEAT_SECONDS", self.heartbeat_interval_seconds),
        ] {
            if let Err(e) = Duration::try_from_secs_f64(value) {
                return Err(CoreError::config(key, format!("{value} is not a valid duration: {e}")));
            }
        }
        if self.heartbeat_interval_seconds == 0.0 {
            return Err(CoreError::config("EVENT_HEARTBEAT_SECONDS", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_seconds)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> CoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| CoreError::config(key, format!("{raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn parse_status_codes(raw: &str) -> CoreResult<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>()
                .map_err(|e| CoreError::config("RETRYABLE_STATUS_CODES", format!("{s:?}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.retryable_status_codes, vec![429, 500, 502, 503, 504]);
        assert_eq!(config.encoding_name, "o200k_base");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("MAX_INPUT_TOKENS", "10"),
            ("MAX_PARALLEL_REQUESTS", "2"),
            ("RETRY_MAX_ATTEMPTS", "4"),
            ("RETRYABLE_STATUS_CODES", "429, 503"),
            ("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "2"),
            ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o"),
        ]))
        .unwrap();

        assert_eq!(config.max_input_tokens, 10);
        assert_eq!(config.max_parallel_requests, 2);
        assert_eq!(config.retry_max_attempts, 4);
        assert_eq!(config.retryable_status_codes, vec![429, 503]);
        assert_eq!(config.circuit_breaker_failure_threshold, 2);
        assert_eq!(config.model_id.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn malformed_value_names_the_variable() {
        let err = EngineConfig::from_lookup(lookup(&[("MAX_PARALLEL_REQUESTS", "many")])).unwrap_err();
        match err {
            CoreError::Config { key, .. } => assert_eq!(key, "MAX_PARALLEL_REQUESTS"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "0")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[("AOAI_TEMPERATURE", "  ")])).unwrap();
        assert_eq!(config.temperature, 0.2);
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        for key in ["RETRY_BASE_DELAY_SECONDS", "RETRY_JITTER_SECONDS", "EVENT_HEARTBEAT_SECONDS"] {
            for raw in ["1e30", "-1", "NaN"] {
                match EngineConfig::from_lookup(lookup(&[(key, raw)])) {
                    Err(CoreError::Config { key: reported, .. }) => assert_eq!(reported, key, "{raw}"),
                    other => panic!("{key}={raw} accepted: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn large_but_valid_delay_is_accepted() {
        let config = EngineConfig::from_lookup(lookup(&[("RETRY_BASE_DELAY_SECONDS", "86400")])).unwrap();
        assert_eq!(config.retry_base_delay_seconds, 86_400.0);
    }
}
