//! Request construction
//!
//! Turns a base URL plus an ordered list of [`RequestOption`]s into an
//! [`ExecutableRequest`]. Options of the same kind override each other in
//! application order, except query parameters which accumulate.

use crate::error::{Error, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use url::Url;

/// A single request construction option
#[derive(Debug, Clone)]
pub enum RequestOption {
    /// HTTP method (default GET)
    Method(Method),
    /// Path resolved against the base URL; a later path replaces an earlier one
    Path(String),
    /// Query parameter; repeated keys accumulate
    QueryParam(String, String),
    /// List-valued query parameter, serialized as one comma-joined value
    QueryParamList(String, Vec<String>),
    /// Header; last write wins per name
    Header(String, String),
    /// JSON body, already serialized
    Body(Bytes),
}

/// Builder for an [`ExecutableRequest`]
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    base_url: Url,
    path: Option<String>,
    query: BTreeMap<String, Vec<String>>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    user_agent: Option<String>,
    error: Option<serde_json::Error>,
}

impl RequestBuilder {
    /// Create a builder for a GET request against the base URL
    pub fn new(base_url: Url) -> Self {
        Self {
            method: Method::GET,
            base_url,
            path: None,
            query: BTreeMap::new(),
            headers: Vec::new(),
            body: None,
            user_agent: None,
            error: None,
        }
    }

    /// Apply a single option
    #[must_use]
    pub fn apply(mut self, option: RequestOption) -> Self {
        match option {
            RequestOption::Method(method) => self.method = method,
            RequestOption::Path(path) => self.path = Some(path),
            RequestOption::QueryParam(key, value) => {
                self.query.entry(key).or_default().push(value);
            }
            RequestOption::QueryParamList(key, values) => {
                if !values.is_empty() {
                    self.query.entry(key).or_default().push(values.join(","));
                }
            }
            RequestOption::Header(key, value) => self.headers.push((key, value)),
            RequestOption::Body(body) => self.body = Some(body),
        }
        self
    }

    /// Apply options in order
    #[must_use]
    pub fn options(self, options: impl IntoIterator<Item = RequestOption>) -> Self {
        options.into_iter().fold(self, Self::apply)
    }

    /// Set the HTTP method
    #[must_use]
    pub fn method(self, method: Method) -> Self {
        self.apply(RequestOption::Method(method))
    }

    /// Set the path relative to the base URL
    #[must_use]
    pub fn path(self, path: impl Into<String>) -> Self {
        self.apply(RequestOption::Path(path.into()))
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.apply(RequestOption::QueryParam(key.into(), value.into()))
    }

    /// Add a list-valued query parameter
    #[must_use]
    pub fn query_list<I, S>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.apply(RequestOption::QueryParamList(key.into(), values))
    }

    /// Set a header
    #[must_use]
    pub fn header(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.apply(RequestOption::Header(key.into(), value.into()))
    }

    /// Set a JSON body
    ///
    /// Serialization failures are reported by [`RequestBuilder::build`].
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => self.apply(RequestOption::Body(Bytes::from(bytes))),
            Err(e) => {
                self.error = Some(e);
                self
            }
        }
    }

    /// Set the client identification string; empty means no header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the request
    pub fn build(self) -> Result<ExecutableRequest> {
        if let Some(e) = self.error {
            return Err(Error::SerializationFailed(e));
        }

        let mut url = match self.path.as_deref() {
            Some(path) if !path.is_empty() => self.base_url.join(path.trim_start_matches('/'))?,
            _ => self.base_url,
        };

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, values) in &self.query {
                for value in values {
                    pairs.append_pair(key, value);
                }
            }
        }

        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| Error::InvalidHeader {
                name: key.clone(),
                message: e.to_string(),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
                name: key.clone(),
                message: e.to_string(),
            })?;
            headers.insert(name, value);
        }

        if self.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if let Some(agent) = self.user_agent.as_deref().filter(|a| !a.is_empty()) {
            let value = HeaderValue::from_str(agent).map_err(|e| Error::InvalidHeader {
                name: USER_AGENT.to_string(),
                message: e.to_string(),
            })?;
            headers.insert(USER_AGENT, value);
        }

        Ok(ExecutableRequest {
            method: self.method,
            url,
            headers,
            body: self.body,
        })
    }
}

/// An immutable, transport-ready request
///
/// Cloning is cheap (the body is reference counted), which lets the retry
/// decorator resend the same request.
#[derive(Debug, Clone)]
pub struct ExecutableRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl ExecutableRequest {
    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute request URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Serialized body, if any
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub(crate) fn into_reqwest(self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(self.method, self.url)
            .headers(self.headers);
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        builder
    }
}
