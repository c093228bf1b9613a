//! Rate limiting decorator
//!
//! Token bucket in front of an inner executor. Calls over budget are rejected
//! locally with [`Error::TooManyRequests`] instead of reaching the network.
//! The bucket is refilled by a background task owned by the decorator; the
//! task stops on [`ThrottleClient::shutdown`] or when the decorator is dropped.

use super::executor::{Execution, Executor};
use super::request::{ExecutableRequest, RequestBuilder};
use crate::config::ThrottleConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

/// Added to every computed delay so a retry lands after the refill tick
const SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Divisor applied to local tokens when the remote side reports 429
const REMOTE_LIMIT_DAMPING: u32 = 5;

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Token bucket shared between the call path and the refill task
#[derive(Debug, Clone)]
pub struct TokenBucket {
    state: Arc<Mutex<BucketState>>,
    max_tokens: u32,
    refill_tokens: u32,
    refill_interval: Duration,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(max_tokens: u32, refill_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            })),
            max_tokens,
            refill_tokens,
            refill_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // the state is two plain integers; a panicked holder cannot leave it inconsistent
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Take one token, or return the delay until the next refill
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let mut state = self.lock();
        if state.tokens == 0 {
            return Err(self.delay_since(state.last_refill));
        }
        state.tokens -= 1;
        Ok(())
    }

    /// Add one refill worth of tokens, capped at capacity
    pub fn refill(&self) {
        let mut state = self.lock();
        state.last_refill = Instant::now();
        state.tokens = state
            .tokens
            .saturating_add(self.refill_tokens)
            .min(self.max_tokens);
    }

    /// Shrink the available tokens after the remote side rejected us
    pub fn dampen(&self) {
        let mut state = self.lock();
        state.tokens /= REMOTE_LIMIT_DAMPING;
    }

    /// Tokens currently available
    pub fn available(&self) -> u32 {
        self.lock().tokens
    }

    /// Delay until the next refill plus the safety margin
    pub fn delay(&self) -> Duration {
        let last_refill = self.lock().last_refill;
        self.delay_since(last_refill)
    }

    fn delay_since(&self, last_refill: Instant) -> Duration {
        self.refill_interval.saturating_sub(last_refill.elapsed()) + SAFETY_MARGIN
    }
}

/// Throttling decorator around an inner executor
pub struct ThrottleClient<E> {
    inner: E,
    bucket: TokenBucket,
    shutdown: CancellationToken,
    logger: String,
}

impl<E: Executor> ThrottleClient<E> {
    /// Wrap `inner` with a token bucket.
    ///
    /// Must be called from within a tokio runtime, which hosts the refill task.
    pub fn new(inner: E, config: ThrottleConfig) -> Result<Self> {
        config.validate()?;
        let handle = Handle::try_current()
            .map_err(|e| Error::config(format!("throttle client needs a tokio runtime: {e}")))?;

        let logger = config.logger.clone().unwrap_or_else(|| "throttle".to_string());
        let bucket = TokenBucket::new(
            config.max_tokens,
            config.refill_tokens,
            config.refill_interval(),
        );
        let shutdown = CancellationToken::new();

        handle.spawn(refill_task(bucket.clone(), shutdown.clone(), logger.clone()));
        trace!(client = %logger, max_tokens = config.max_tokens, "new client");

        Ok(Self {
            inner,
            bucket,
            shutdown,
            logger,
        })
    }

    /// Tokens currently available
    pub fn available_tokens(&self) -> u32 {
        self.bucket.available()
    }

    /// Stop the refill task
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether the refill task has been stopped
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Get the wrapped executor
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

async fn refill_task(bucket: TokenBucket, shutdown: CancellationToken, logger: String) {
    let period = bucket.refill_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                trace!(client = %logger, "refill task stopped");
                return;
            }
            _ = ticker.tick() => {
                bucket.refill();
                debug!(client = %logger, tokens = bucket.available(), "refilled tokens");
            }
        }
    }
}

#[async_trait]
impl<E: Executor> Executor for ThrottleClient<E> {
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

        if ctx.is_cancelled() {
            return Err(Error::ContextCanceled);
        }

        if let Err(delay) = self.bucket.try_acquire() {
            debug!(client = %self.logger, delay_ms = delay.as_millis() as u64, "out of tokens");
            return Err(Error::too_many_requests(delay));
        }

        match self.inner.bare_execute(ctx, request).await {
            Err(Error::TooManyRequests { .. }) => {
                // local and remote limits are independent; back off harder than usual
                warn!(client = %self.logger, "too many requests reported by remote service");
                self.bucket.dampen();
                Err(Error::too_many_requests(self.bucket.delay() / 2))
            }
            other => other,
        }
    }
}

impl<E> Drop for ThrottleClient<E> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<E> std::fmt::Debug for ThrottleClient<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleClient")
            .field("bucket", &self.bucket)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bucket_drains_to_zero() {
        let bucket = TokenBucket::new(3, 1, Duration::from_secs(10));
        for _ in 0..3 {
            assert!(bucket.try_acquire().is_ok());
        }
        assert!(bucket.try_acquire().is_err());
        assert_eq!(bucket.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_delay_includes_margin() {
        let bucket = TokenBucket::new(1, 1, Duration::from_secs(10));
        bucket.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        let delay = bucket.try_acquire().unwrap_err();
        assert_eq!(delay, Duration::from_secs(6) + SAFETY_MARGIN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_delay_never_below_margin() {
        let bucket = TokenBucket::new(1, 1, Duration::from_secs(1));
        bucket.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(bucket.delay(), SAFETY_MARGIN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped() {
        let bucket = TokenBucket::new(5, 3, Duration::from_secs(1));
        for _ in 0..4 {
            bucket.try_acquire().unwrap();
        }
        bucket.refill();
        assert_eq!(bucket.available(), 4);
        bucket.refill();
        assert_eq!(bucket.available(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dampen_divides_tokens() {
        let bucket = TokenBucket::new(30, 30, Duration::from_secs(60));
        for _ in 0..5 {
            bucket.try_acquire().unwrap();
        }
        bucket.dampen();
        assert_eq!(bucket.available(), 5);
    }
}
