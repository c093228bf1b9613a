//! Base HTTP executor
//!
//! Performs exactly one round trip per call and classifies the response:
//! - 2xx is returned as an [`Execution`]
//! - 429, 404 and every other status become typed failures
//! - transport errors prefer the caller's cancellation when it raced them

use super::executor::{Execution, Executor};
use super::request::{ExecutableRequest, RequestBuilder};
use crate::config::BaseConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

/// Innermost link of the chain: talks to the remote endpoint
pub struct BaseClient {
    client: Client,
    base_url: Url,
    user_agent: String,
    default_headers: HashMap<String, String>,
    logger: String,
}

impl BaseClient {
    /// Create a base client from configuration
    pub fn new(mut config: BaseConfig) -> Result<Self> {
        let base_url = match config.base_url.as_deref() {
            Some(url) if !url.is_empty() => Url::parse(url)?,
            _ => return Err(Error::BaseUrlNotSet),
        };

        config.validate()?;

        let client = match config.transport.take() {
            Some(client) => client,
            None => Client::builder()
                .timeout(config.request_timeout())
                .build()
                .map_err(|e| Error::config(format!("failed to build HTTP transport: {e}")))?,
        };

        let logger = config.logger.unwrap_or_else(|| "base".to_string());
        trace!(client = %logger, base_url = %base_url, "new client");

        Ok(Self {
            client,
            base_url,
            user_agent: config.user_agent,
            default_headers: config.default_headers,
            logger,
        })
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Configured user agent
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Release a failed response body, combining errors if that fails too.
    ///
    /// Cancellation drops the response, which closes the connection.
    async fn release(&self, ctx: &CancellationToken, response: Response, failure: Error) -> Error {
        tokio::select! {
            () = ctx.cancelled() => {
                debug!(client = %self.logger, "cancelled while releasing response body");
                failure
            }
            result = response.bytes() => match result {
                Ok(_) => failure,
                Err(release) => Error::Combined {
                    primary: Box::new(failure),
                    release,
                },
            },
        }
    }
}

#[async_trait]
impl Executor for BaseClient {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn new_request(&self) -> RequestBuilder {
        trace!(client = %self.logger, "new request");
        let mut builder = RequestBuilder::new(self.base_url.clone()).user_agent(&self.user_agent);
        for (key, value) in &self.default_headers {
            builder = builder.header(key, value);
        }
        builder
    }

    async fn bare_execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
    ) -> Result<Execution> {
        debug!(client = %self.logger, method = %request.method(), url = %request.url(), "bare execute");

        if ctx.is_cancelled() {
            return Err(Error::ContextCanceled);
        }

        let resource = request.url().to_string();
        let send = request.into_reqwest(&self.client).send();

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(Error::ContextCanceled),
            result = send => match result {
                Ok(response) => response,
                // the cancellation is more useful than whatever the transport reported
                Err(_) if ctx.is_cancelled() => return Err(Error::ContextCanceled),
                Err(e) => return Err(Error::Transport(e)),
            },
        };

        let status = response.status();
        if status.is_success() {
            return Ok(Execution::new(response));
        }

        let failure = classify(status, resource);
        debug!(client = %self.logger, status = status.as_u16(), error = %failure, "request failed");
        Err(self.release(ctx, response, failure).await)
    }
}

impl std::fmt::Debug for BaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseClient")
            .field("base_url", &self.base_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

/// Map a non-success status to its failure kind
pub(crate) fn classify(status: StatusCode, resource: String) -> Error {
    match status {
        // retry hints are not parsed; the delay is decided upstream
        StatusCode::TOO_MANY_REQUESTS => Error::TooManyRequests { delay: None },
        StatusCode::NOT_FOUND => Error::ResourceNotFound { resource },
        _ => Error::Generic {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
        },
    }
}
