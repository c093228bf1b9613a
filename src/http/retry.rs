//! Retrying decorator
//!
//! Failure-kind-aware retry loop around an inner executor:
//! - `TooManyRequests`: wait out the delay, attempt budget untouched
//! - `ResourceNotFound` and cancellation: returned immediately
//! - anything else: sleep the fixed delay and spend one attempt

use super::executor::{Execution, Executor};
use super::request::{ExecutableRequest, RequestBuilder};
use crate::config::RetryConfig;
use crate::error::{Error, Result, RetryAction};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

/// Attempt budget for the retry decorator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxAttempts {
    /// At most this many failed attempts (zero behaves like one)
    Bounded(u32),
    /// Retry until the caller's context is cancelled
    #[default]
    Unbounded,
}

impl MaxAttempts {
    fn allows(self, used: u32) -> bool {
        match self {
            MaxAttempts::Bounded(max) => used < max.max(1),
            MaxAttempts::Unbounded => true,
        }
    }
}

impl Serialize for MaxAttempts {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MaxAttempts::Bounded(n) => serializer.serialize_u32(*n),
            MaxAttempts::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxAttempts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(MaxAttempts::Bounded(n)),
            Raw::Word(word) if word.eq_ignore_ascii_case("unbounded") => Ok(MaxAttempts::Unbounded),
            Raw::Word(word) => Err(serde::de::Error::custom(format!(
                "expected a non-negative integer or \"unbounded\", got \"{word}\""
            ))),
        }
    }
}

/// Retrying decorator around an inner executor
pub struct RetryClient<E> {
    inner: E,
    max_attempts: MaxAttempts,
    delay: Duration,
    max_rate_limit_wait: Option<Duration>,
    logger: String,
}

impl<E: Executor> RetryClient<E> {
    /// Wrap `inner` with the retry policy from `config`
    pub fn new(inner: E, config: RetryConfig) -> Self {
        let logger = config.logger.clone().unwrap_or_else(|| "retry".to_string());
        trace!(client = %logger, max_attempts = ?config.max_attempts, "new client");
        Self {
            inner,
            max_attempts: config.max_attempts,
            delay: config.delay(),
            max_rate_limit_wait: config.rate_limit_wait_cap(),
            logger,
        }
    }

    /// Configured attempt budget
    pub fn max_attempts(&self) -> MaxAttempts {
        self.max_attempts
    }

    /// Get the wrapped executor
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

/// Sleep unless cancelled first; returns false on cancellation
async fn pause(ctx: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = ctx.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

#[async_trait]
impl<E: Executor> Executor for RetryClient<E> {
    fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    fn new_request(&self) -> RequestBuilder {
        self.inner.new_request()
    }

    async fn bare_execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
    ) -> Result<Execution> {
        trace!(client = %self.logger, method = %request.method(), url = %request.url(), "bare execute");

        let mut attempts = 0u32;
        let mut waited = Duration::ZERO;
        let mut last_error = Error::ContextCanceled;

        while self.max_attempts.allows(attempts) && !ctx.is_cancelled() {
            let error = match self.inner.bare_execute(ctx, request.clone()).await {
                Ok(execution) => return Ok(execution),
                Err(e) => e,
            };

            let wait = match error.retry_action() {
                RetryAction::Abort => {
                    debug!(client = %self.logger, error = %error, "not retrying");
                    return Err(error);
                }
                RetryAction::Wait(delay) => {
                    let delay = delay.unwrap_or(self.delay);
                    if let Some(cap) = self.max_rate_limit_wait {
                        if waited + delay > cap {
                            debug!(client = %self.logger, waited_ms = waited.as_millis() as u64, "rate limit wait budget exhausted");
                            return Err(error);
                        }
                    }
                    waited += delay;
                    debug!(client = %self.logger, delay_ms = delay.as_millis() as u64, "too many requests, waiting");
                    delay
                }
                RetryAction::Backoff => {
                    attempts += 1;
                    debug!(client = %self.logger, error = %error, attempt = attempts, delay_ms = self.delay.as_millis() as u64, "attempt failed");
                    if !self.max_attempts.allows(attempts) {
                        return Err(error);
                    }
                    self.delay
                }
            };

            last_error = error;
            if !pause(ctx, wait).await {
                break;
            }
        }

        Err(last_error)
    }
}

impl<E> std::fmt::Debug for RetryClient<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryClient")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("max_rate_limit_wait", &self.max_rate_limit_wait)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod retry_tests {
    use super::*;

    #[test]
    fn test_bounded_allows() {
        let max = MaxAttempts::Bounded(3);
        assert!(max.allows(0));
        assert!(max.allows(2));
        assert!(!max.allows(3));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let max = MaxAttempts::Bounded(0);
        assert!(max.allows(0));
        assert!(!max.allows(1));
    }

    #[test]
    fn test_unbounded_always_allows() {
        assert!(MaxAttempts::Unbounded.allows(u32::MAX));
    }

    #[test]
    fn test_max_attempts_from_yaml() {
        let bounded: MaxAttempts = serde_yaml::from_str("5").unwrap();
        assert_eq!(bounded, MaxAttempts::Bounded(5));

        let unbounded: MaxAttempts = serde_yaml::from_str("unbounded").unwrap();
        assert_eq!(unbounded, MaxAttempts::Unbounded);

        assert!(serde_yaml::from_str::<MaxAttempts>("forever").is_err());
    }
}
