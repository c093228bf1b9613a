// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # rest-chain
//!
//! An outbound REST client assembled from composable layers. Every layer
//! implements the same [`Executor`] contract, so callers never need to know
//! which behaviors are installed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rest_chain::{create_client, BaseConfig, ClientConfig, Executor, Json, RetryConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> rest_chain::Result<()> {
//!     let client = create_client(
//!         ClientConfig::new()
//!             .base(BaseConfig::new("https://api.example.com"))
//!             .retry(RetryConfig::default()),
//!     )?;
//!
//!     let request = client.new_request().path("/v1/items").query("id", "42").build()?;
//!     let mut items = Json::<serde_json::Value>::new();
//!     client
//!         .execute(&CancellationToken::new(), request, Some(&mut items))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   caller
//!     │ execute(ctx, request, target)
//! ┌───▼──────────────┐
//! │ RetryClient      │  429 → wait, 404 → stop, other → fixed backoff
//! ├──────────────────┤
//! │ ThrottleClient   │  token bucket, local 429 without a network call
//! ├──────────────────┤
//! │ BaseClient       │  one round trip, status classification
//! └──────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Client chain configuration
pub mod config;

/// HTTP executors and request construction
pub mod http;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{BaseConfig, ClientConfig, RetryConfig, ThrottleConfig};
pub use error::{Error, Result, RetryAction};
pub use http::{
    create_client, BaseClient, ByteSink, DecodeTarget, ExecutableRequest, Execution, Executor,
    Json, MaxAttempts, RequestBuilder, RequestOption, RetryClient, ThrottleClient,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
