//! The request execution contract shared by every chain layer
//!
//! [`Executor`] is implemented by the base client and by each decorator, so
//! layers can be stacked in any combination. Callers only ever talk to the
//! outermost layer.

use super::request::{ExecutableRequest, RequestBuilder};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Result of a successful execution
///
/// Owns the response body until it is read, decoded into a target, or the
/// value is dropped (which releases the connection).
#[derive(Debug)]
pub struct Execution {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: Option<Response>,
}

impl Execution {
    pub(crate) fn new(response: Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            url: response.url().clone(),
            body: Some(response),
        }
    }

    /// HTTP status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Numeric HTTP status code
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Final response URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the body has already been consumed
    pub fn is_consumed(&self) -> bool {
        self.body.is_none()
    }

    /// Read the full body; empty if it was already consumed
    pub async fn bytes(mut self) -> Result<Bytes> {
        match self.body.take() {
            Some(response) => Ok(response.bytes().await?),
            None => Ok(Bytes::new()),
        }
    }

    /// Read the body as text
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::decode(e.to_string()))
    }

    /// Parse the body as JSON
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::decode(e.to_string()))
    }

    /// Explicitly discard the body
    pub fn discard(mut self) {
        self.body.take();
    }

    /// Hand the body to a decode target, leaving this execution consumed
    pub async fn decode_into(&mut self, target: &mut dyn DecodeTarget) -> Result<()> {
        match self.body.take() {
            Some(response) => target.decode(response).await,
            None => Err(Error::decode("response body already consumed")),
        }
    }
}

/// Something a response body can be decoded into
#[async_trait]
pub trait DecodeTarget: Send {
    /// Consume the response body
    async fn decode(&mut self, response: Response) -> Result<()>;
}

/// Decode target parsing the body as JSON into `T`
///
/// An empty body is not a failure; the target simply stays empty.
#[derive(Debug)]
pub struct Json<T> {
    value: Option<T>,
}

impl<T> Json<T> {
    /// Create an empty target
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Decoded value, if the body was not empty
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Take the decoded value
    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send> DecodeTarget for Json<T> {
    async fn decode(&mut self, response: Response) -> Result<()> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            self.value = None;
            return Ok(());
        }
        let value = serde_json::from_slice(&bytes).map_err(|e| Error::decode(e.to_string()))?;
        self.value = Some(value);
        Ok(())
    }
}

/// Decode target streaming the raw body into a writer
#[derive(Debug)]
pub struct ByteSink<W> {
    writer: W,
    written: u64,
}

impl<W> ByteSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> DecodeTarget for ByteSink<W> {
    async fn decode(&mut self, mut response: Response) -> Result<()> {
        while let Some(chunk) = response.chunk().await? {
            self.writer.write_all(&chunk).await?;
            self.written += chunk.len() as u64;
        }
        self.writer.flush().await?;
        Ok(())
    }
}

/// A link in the client chain
#[async_trait]
pub trait Executor: Send + Sync {
    /// Base URL requests are resolved against
    fn base_url(&self) -> &Url;

    /// Start a request seeded with the chain's base URL and client defaults
    fn new_request(&self) -> RequestBuilder;

    /// Perform the request without decoding the body
    async fn bare_execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
    ) -> Result<Execution>;

    /// Perform the request and, if a target is given, decode the body into it
    async fn execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
        target: Option<&mut (dyn DecodeTarget + '_)>,
    ) -> Result<Execution> {
        let mut execution = self.bare_execute(ctx, request).await?;
        if let Some(target) = target {
            execution.decode_into(target).await?;
        }
        Ok(execution)
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Box<E> {
    fn base_url(&self) -> &Url {
        (**self).base_url()
    }

    fn new_request(&self) -> RequestBuilder {
        (**self).new_request()
    }

    async fn bare_execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
    ) -> Result<Execution> {
        (**self).bare_execute(ctx, request).await
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
        target: Option<&mut (dyn DecodeTarget + '_)>,
    ) -> Result<Execution> {
        (**self).execute(ctx, request, target).await
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn base_url(&self) -> &Url {
        (**self).base_url()
    }

    fn new_request(&self) -> RequestBuilder {
        (**self).new_request()
    }

    async fn bare_execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
    ) -> Result<Execution> {
        (**self).bare_execute(ctx, request).await
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutableRequest,
        target: Option<&mut (dyn DecodeTarget + '_)>,
    ) -> Result<Execution> {
        (**self).execute(ctx, request, target).await
    }
}
