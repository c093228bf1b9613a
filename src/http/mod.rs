//! HTTP client chain
//!
//! Provides a REST client assembled from interchangeable layers that all
//! implement [`Executor`].
//!
//! # Layers
//!
//! - **Base**: one network round trip, status classification
//! - **Throttle**: token bucket rate limiting with local rejection
//! - **Retry**: failure-kind-aware retry loop with fixed backoff

mod chain;
mod client;
mod executor;
mod rate_limit;
mod request;
mod retry;

pub use chain::create_client;
pub use client::BaseClient;
pub use executor::{ByteSink, DecodeTarget, Execution, Executor, Json};
pub use rate_limit::{ThrottleClient, TokenBucket};
pub use request::{ExecutableRequest, RequestBuilder, RequestOption};
pub use retry::{MaxAttempts, RetryClient};
