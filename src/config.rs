//! Client chain configuration
//!
//! One optional section per chain layer. Loadable from YAML:
//!
//! ```yaml
//! base:
//!   base_url: https://api.example.com
//!   user_agent: my-app/1.0
//! throttle:
//!   max_tokens: 10
//!   refill_tokens: 5
//!   refill_interval_ms: 10000
//! retry:
//!   max_attempts: unbounded
//!   delay_ms: 10000
//! ```

use crate::error::{Error, Result};
use crate::http::MaxAttempts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-Level Client Config
// ============================================================================

/// Configuration for a whole client chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base executor settings (required to build a chain)
    #[serde(default)]
    pub base: Option<BaseConfig>,

    /// Throttling decorator settings; no throttling when absent
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,

    /// Retrying decorator settings; no retries when absent
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ClientConfig {
    /// Create an empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a config from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Set the base section
    #[must_use]
    pub fn base(mut self, base: BaseConfig) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the throttle section
    #[must_use]
    pub fn throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Set the retry section
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

// ============================================================================
// Base Config
// ============================================================================

/// Base executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Base URL all request paths are resolved against
    #[serde(default)]
    pub base_url: Option<String>,

    /// User agent; an empty string sends no header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in milliseconds (ignored with a transport override)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Headers added to every request built by the chain
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    /// Logger name recorded on this layer's events
    #[serde(default)]
    pub logger: Option<String>,

    /// Transport override
    #[serde(skip)]
    pub transport: Option<reqwest::Client>,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            default_headers: HashMap::new(),
            logger: None,
            transport: None,
        }
    }
}

fn default_user_agent() -> String {
    format!("rest-chain/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl BaseConfig {
    /// Create a config for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::invalid_value("timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// Add a default header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set the logger name
    #[must_use]
    pub fn logger(mut self, name: impl Into<String>) -> Self {
        self.logger = Some(name.into());
        self
    }

    /// Use a preconfigured reqwest client as transport
    #[must_use]
    pub fn transport(mut self, client: reqwest::Client) -> Self {
        self.transport = Some(client);
        self
    }
}

// ============================================================================
// Throttle Config
// ============================================================================

/// Token bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Bucket capacity
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Tokens added per refill
    #[serde(default = "default_refill_tokens")]
    pub refill_tokens: u32,

    /// Refill interval in milliseconds
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,

    /// Logger name recorded on this layer's events
    #[serde(default)]
    pub logger: Option<String>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            refill_tokens: default_refill_tokens(),
            refill_interval_ms: default_refill_interval_ms(),
            logger: None,
        }
    }
}

fn default_max_tokens() -> u32 {
    30
}

fn default_refill_tokens() -> u32 {
    30
}

fn default_refill_interval_ms() -> u64 {
    60_000
}

impl ThrottleConfig {
    /// Create a throttle config
    pub fn new(max_tokens: u32, refill_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            max_tokens,
            refill_tokens,
            refill_interval_ms: refill_interval.as_millis() as u64,
            logger: None,
        }
    }

    /// Set the logger name
    #[must_use]
    pub fn logger(mut self, name: impl Into<String>) -> Self {
        self.logger = Some(name.into());
        self
    }

    /// Refill interval as a duration
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    /// Check that all limits are positive
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::invalid_value("max_tokens", "must be greater than zero"));
        }
        if self.refill_tokens == 0 {
            return Err(Error::invalid_value(
                "refill_tokens",
                "must be greater than zero",
            ));
        }
        if self.refill_interval_ms == 0 {
            return Err(Error::invalid_value(
                "refill_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Retry Config
// ============================================================================

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt budget: an integer or `unbounded`
    #[serde(default)]
    pub max_attempts: MaxAttempts,

    /// Delay between failed attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Cap on the cumulative time spent waiting out rate limits
    #[serde(default)]
    pub max_rate_limit_wait_ms: Option<u64>,

    /// Logger name recorded on this layer's events
    #[serde(default)]
    pub logger: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MaxAttempts::Unbounded,
            delay_ms: default_delay_ms(),
            max_rate_limit_wait_ms: None,
            logger: None,
        }
    }
}

fn default_delay_ms() -> u64 {
    3_000
}

impl RetryConfig {
    /// Create a retry config
    pub fn new(max_attempts: MaxAttempts, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Cap the cumulative rate limit wait
    #[must_use]
    pub fn max_rate_limit_wait(mut self, cap: Duration) -> Self {
        self.max_rate_limit_wait_ms = Some(cap.as_millis() as u64);
        self
    }

    /// Set the logger name
    #[must_use]
    pub fn logger(mut self, name: impl Into<String>) -> Self {
        self.logger = Some(name.into());
        self
    }

    /// Delay between failed attempts
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Cap on cumulative rate limit waits, if any
    pub fn rate_limit_wait_cap(&self) -> Option<Duration> {
        self.max_rate_limit_wait_ms.map(Duration::from_millis)
    }
}
