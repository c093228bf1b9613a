//! Error types for rest-chain
//!
//! This module defines the error hierarchy for the whole client chain.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! The HTTP failure kinds (`TooManyRequests`, `ResourceNotFound`, `Generic`,
//! `ContextCanceled`, `Transport`) are what the chain layers produce and what
//! the retry decorator dispatches on through [`Error::retry_action`].

use std::time::Duration;
use thiserror::Error;

/// The main error type for rest-chain
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Execution Failures
    // ============================================================================
    #[error("Too many requests; wait {}", fmt_delay(.delay))]
    TooManyRequests { delay: Option<Duration> },

    #[error("Resource not found: {resource}")]
    ResourceNotFound { resource: String },

    #[error("HTTP {status}: {message}")]
    Generic { status: u16, message: String },

    #[error("Context canceled")]
    ContextCanceled,

    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{primary}; additionally failed to release response body: {release}")]
    Combined {
        primary: Box<Error>,
        release: reqwest::Error,
    },

    // ============================================================================
    // Request Construction Errors
    // ============================================================================
    #[error("Base URL not set")]
    BaseUrlNotSet,

    #[error("Malformed URL: {0}")]
    MalformedUrl(#[from] url::ParseError),

    #[error("Could not serialize body: {0}")]
    SerializationFailed(#[source] serde_json::Error),

    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    // ============================================================================
    // Response Handling Errors
    // ============================================================================
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

fn fmt_delay(delay: &Option<Duration>) -> String {
    match delay {
        Some(d) => format!("{d:?}"),
        None => "unknown".to_string(),
    }
}

/// What the retry decorator should do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Rate limited: wait (for the given delay, if known) without consuming an attempt
    Wait(Option<Duration>),
    /// Terminal: return the error as is
    Abort,
    /// Sleep the fixed delay and consume one attempt
    Backoff,
}

impl Error {
    /// Create a too-many-requests error with a known delay
    pub fn too_many_requests(delay: Duration) -> Self {
        Self::TooManyRequests { delay: Some(delay) }
    }

    /// Create a resource not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource: resource.into(),
        }
    }

    /// Create a generic HTTP status error
    pub fn generic(status: u16, message: impl Into<String>) -> Self {
        Self::Generic {
            status,
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// HTTP status code associated with this failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::TooManyRequests { .. } => Some(429),
            Error::ResourceNotFound { .. } => Some(404),
            Error::Generic { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            Error::Combined { primary, .. } => primary.status_code(),
            _ => None,
        }
    }

    /// Check if this is a rate limiting failure
    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, Error::TooManyRequests { .. })
    }

    /// Classify this error for the retry decorator.
    ///
    /// Every variant is listed so that adding one forces a decision here.
    pub fn retry_action(&self) -> RetryAction {
        match self {
            Error::TooManyRequests { delay } => RetryAction::Wait(*delay),
            Error::ResourceNotFound { .. } | Error::ContextCanceled => RetryAction::Abort,
            Error::Generic { .. } | Error::Transport(_) => RetryAction::Backoff,
            Error::Combined { primary, .. } => primary.retry_action(),
            Error::BaseUrlNotSet
            | Error::MalformedUrl(_)
            | Error::SerializationFailed(_)
            | Error::InvalidHeader { .. }
            | Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_) => RetryAction::Abort,
            Error::Decode { .. } | Error::Io(_) => RetryAction::Backoff,
        }
    }
}

/// Result type alias for rest-chain
pub type Result<T> = std::result::Result<T, Error>;
