//! Integration tests using a mock HTTP server
//!
//! Exercises the public API end to end: YAML config → assembled chain →
//! requests against a mock server → decoded results or typed failures.

use async_trait::async_trait;
use rest_chain::{
    create_client, BaseClient, BaseConfig, ClientConfig, Error, ExecutableRequest, Execution,
    Executor, Json, MaxAttempts, RequestBuilder, RetryClient, RetryConfig, ThrottleClient,
    ThrottleConfig,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct Item {
    id: u64,
    name: String,
}

fn chain_yaml(uri: &str) -> String {
    format!(
        r"
base:
  base_url: {uri}
  user_agent: integration-agent
throttle:
  max_tokens: 10
  refill_tokens: 5
  refill_interval_ms: 10000
retry:
  max_attempts: 3
  delay_ms: 10
"
    )
}

// ============================================================================
// Full Chain
// ============================================================================

#[tokio::test]
async fn test_yaml_chain_get_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(query_param("id", "42"))
        .and(header("User-Agent", "integration-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 42, "name": "Widget"}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = ClientConfig::from_yaml_str(&chain_yaml(&mock_server.uri())).unwrap();
    let client = create_client(config).unwrap();

    let request = client
        .new_request()
        .path("/v1/items")
        .query("id", "42")
        .build()
        .unwrap();
    let mut items = Json::<Vec<Item>>::new();
    let execution = client
        .execute(&CancellationToken::new(), request, Some(&mut items))
        .await
        .unwrap();

    assert_eq!(execution.status_code(), 200);
    let items = items.into_inner().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, 42);
    assert_eq!(items[0].name, "Widget");
}

#[tokio::test]
async fn test_yaml_chain_exhausts_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/always-fail"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = ClientConfig::from_yaml_str(&chain_yaml(&mock_server.uri())).unwrap();
    let client = create_client(config).unwrap();

    let request = client.new_request().path("/v1/always-fail").build().unwrap();
    let err = client
        .execute(&CancellationToken::new(), request, None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Generic { status: 502, .. }));
    assert_eq!(err.status_code(), Some(502));
}

#[tokio::test]
async fn test_chain_waits_out_remote_rate_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    // no throttle layer: the unknown 429 delay falls back to the fixed retry delay
    let client = create_client(
        ClientConfig::new()
            .base(BaseConfig::new(mock_server.uri()))
            .retry(RetryConfig::new(
                MaxAttempts::Bounded(1),
                Duration::from_millis(20),
            )),
    )
    .unwrap();

    let request = client.new_request().path("/v1/limited").build().unwrap();
    let execution = client
        .execute(&CancellationToken::new(), request, None)
        .await
        .unwrap();

    assert_eq!(execution.status_code(), 200);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_throttle_rejects_without_network_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = create_client(
        ClientConfig::new()
            .base(BaseConfig::new(mock_server.uri()))
            .throttle(ThrottleConfig::new(2, 2, Duration::from_secs(60))),
    )
    .unwrap();
    let ctx = CancellationToken::new();

    for _ in 0..2 {
        let request = client.new_request().build().unwrap();
        client.execute(&ctx, request, None).await.unwrap();
    }

    let request = client.new_request().build().unwrap();
    let err = client.execute(&ctx, request, None).await.unwrap_err();
    assert!(err.is_too_many_requests());
}

#[tokio::test]
async fn test_cancel_unbounded_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = create_client(
        ClientConfig::new()
            .base(BaseConfig::new(mock_server.uri()))
            .retry(RetryConfig::new(
                MaxAttempts::Unbounded,
                Duration::from_millis(20),
            )),
    )
    .unwrap();

    let ctx = CancellationToken::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let request = client.new_request().build().unwrap();
    let err = tokio::time::timeout(Duration::from_secs(5), client.execute(&ctx, request, None))
        .await
        .expect("retry loop should stop after cancellation")
        .unwrap_err();

    // cancel can land between attempts (last failure) or mid-request
    assert!(
        matches!(err, Error::Generic { status: 503, .. } | Error::ContextCanceled),
        "unexpected error: {err:?}"
    );
}

// ============================================================================
// Manual Composition
// ============================================================================

/// User-defined layer counting calls that reach it
struct Counting<E> {
    inner: E,
    calls: AtomicUsize,
}

#[async_trait]
impl<E: Executor> Executor for Counting<E> {
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
    ) -> rest_chain::Result<Execution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.bare_execute(ctx, request).await
    }
}

#[tokio::test]
async fn test_custom_layer_in_manual_chain() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let base = BaseClient::new(BaseConfig::new(mock_server.uri())).unwrap();
    let counting = Counting {
        inner: base,
        calls: AtomicUsize::new(0),
    };
    let throttle =
        ThrottleClient::new(counting, ThrottleConfig::new(5, 5, Duration::from_secs(60))).unwrap();
    let client = RetryClient::new(
        throttle,
        RetryConfig::new(MaxAttempts::Bounded(3), Duration::from_millis(10)),
    );

    let request = client.new_request().path("/anything").build().unwrap();
    client
        .execute(&CancellationToken::new(), request, None)
        .await
        .unwrap();

    let throttle = client.inner();
    assert_eq!(throttle.inner().calls.load(Ordering::SeqCst), 2);
    assert_eq!(throttle.available_tokens(), 3);
}

#[tokio::test]
async fn test_missing_base_section() {
    let config = ClientConfig::from_yaml_str("retry:\n  max_attempts: 1\n").unwrap();
    let err = create_client(config).err().unwrap();
    assert!(matches!(err, Error::MissingConfigField { .. }));
}
