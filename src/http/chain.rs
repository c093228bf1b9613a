//! Client chain assembly
//!
//! Layers are stacked in a fixed order, innermost first:
//! base executor, then throttling, then retry. Retry is outermost so that
//! every retried attempt goes through the token bucket again.

use super::client::BaseClient;
use super::executor::Executor;
use super::rate_limit::ThrottleClient;
use super::retry::RetryClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use tracing::debug;

/// Build the client chain described by `config`.
///
/// Fails when no base section is configured or it has no base URL. A throttle
/// section requires a running tokio runtime.
pub fn create_client(config: ClientConfig) -> Result<Box<dyn Executor>> {
    let base = config.base.ok_or_else(|| Error::missing_field("base"))?;
    let mut client: Box<dyn Executor> = Box::new(BaseClient::new(base)?);

    if let Some(throttle) = config.throttle {
        debug!(max_tokens = throttle.max_tokens, "adding throttle layer");
        client = Box::new(ThrottleClient::new(client, throttle)?);
    }

    if let Some(retry) = config.retry {
        debug!(max_attempts = ?retry.max_attempts, "adding retry layer");
        client = Box::new(RetryClient::new(client, retry));
    }

    Ok(client)
}
