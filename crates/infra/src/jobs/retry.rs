//! Retry classification and backoff schedule for remote calls.

use std::time::Duration;

use rand::Rng;

use chunkflow_ai::CompletionError;
use chunkflow_core::EngineConfig;

/// Message fragments that mark a failure as rate limiting.
const RATE_LIMIT_MARKERS: [&str; 3] = ["rate limit", "too many requests", "retry later"];

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        self == ErrorClass::Retryable
    }
}

/// Classify a remote failure.
///
/// A status code in `retryable_status_codes` or ≥ 500 is retryable.
/// Otherwise the message is checked (case-insensitively) for rate-limit
/// phrases. Everything else is fatal.
pub fn classify(error: &CompletionError, retryable_status_codes: &[u16]) -> ErrorClass {
    if let Some(status) = error.status_code() {
        if retryable_status_codes.contains(&status) || status >= 500 {
            return ErrorClass::Retryable;
        }
    }

    let message = error.to_string().to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    /// Upper bound of the uniform random delay added to each wait.
    pub jitter: Duration,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_secs_f64(config.retry_base_delay_seconds),
            backoff_factor: config.retry_backoff_factor,
            jitter: Duration::from_secs_f64(config.retry_jitter_seconds),
            retryable_status_codes: config.retryable_status_codes.clone(),
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn classify(&self, error: &CompletionError) -> ErrorClass {
        classify(error, &self.retryable_status_codes)
    }

    /// Retry after failed attempt `attempt` (1-indexed)?
    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        class.is_retryable() && attempt < self.max_attempts
    }

    /// `base * factor^(attempt - 1)`, without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * exp;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Backoff plus `uniform(0, jitter)`.
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let backoff = self.backoff_for_attempt(attempt);
        if self.jitter.is_zero() {
            return backoff;
        }
        let jitter = rng.gen_range(0.0..=self.jitter.as_secs_f64());
        backoff.saturating_add(Duration::from_secs_f64(jitter))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            jitter: Duration::ZERO,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }

    #[test]
    fn default_codes_are_retryable() {
        let p = policy();
        for code in [429, 500, 502, 503, 504] {
            assert_eq!(p.classify(&CompletionError::status(code, "x")), ErrorClass::Retryable, "{code}");
        }
    }

    #[test]
    fn any_5xx_is_retryable() {
        assert_eq!(policy().classify(&CompletionError::status(599, "x")), ErrorClass::Retryable);
    }

    #[test]
    fn client_errors_are_fatal() {
        assert_eq!(policy().classify(&CompletionError::status(400, "bad request")), ErrorClass::Fatal);
        assert_eq!(policy().classify(&CompletionError::status(401, "unauthorized")), ErrorClass::Fatal);
    }

    #[test]
    fn rate_limit_text_is_retryable() {
        let p = policy();
        assert!(p.classify(&CompletionError::other("Rate limit exceeded")).is_retryable());
        assert!(p.classify(&CompletionError::Transport("Too Many Requests".into())).is_retryable());
        assert!(p.classify(&CompletionError::other("please retry later")).is_retryable());
        assert!(!p.classify(&CompletionError::other("content filtered")).is_retryable());
    }

    #[test]
    fn plain_timeout_is_fatal() {
        assert_eq!(policy().classify(&CompletionError::Timeout("60s elapsed".into())), ErrorClass::Fatal);
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let p = policy();
        assert!(p.should_retry(ErrorClass::Retryable, 1));
        assert!(p.should_retry(ErrorClass::Retryable, 2));
        assert!(!p.should_retry(ErrorClass::Retryable, 3));
        assert!(!p.should_retry(ErrorClass::Fatal, 1));
    }

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let p = policy();
        assert_eq!(p.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_strictly_increasing_without_jitter() {
        let p = policy();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..10 {
            assert!(p.delay_for_attempt(attempt + 1, &mut rng) > p.delay_for_attempt(attempt, &mut rng));
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = RetryPolicy {
            jitter: Duration::from_millis(250),
            ..policy()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let d = p.delay_for_attempt(1, &mut rng);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(350));
        }
    }

    #[test]
    fn from_config_uses_engine_defaults() {
        let p = RetryPolicy::from_config(&EngineConfig::default());
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.base_delay, Duration::from_secs(1));
        assert_eq!(p.jitter, Duration::from_millis(250));
    }
}
