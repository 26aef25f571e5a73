//! The request pipeline over a real reqwest transport and a mock exchange.

mod common;

use std::time::{Duration, Instant};

use common::{closed_port, MockExchange, MockResponse};
use exchange_router::resilience::rate_limit::default_quotas;
use exchange_router::resilience::{
    boxed, compose, decorator, CircuitBreakerConfig, CircuitBreakerLayer, ExchangeRequest,
    FetchError, HttpService, NetworkErrorCode, RateLimitLayer, RateLimiter, ReqwestTransport,
    RetryLayer, RetryPolicy, TimeoutLayer,
};
use reqwest::StatusCode;
use tower::ServiceExt;

fn transport() -> HttpService {
    boxed(ReqwestTransport::with_defaults().unwrap())
}

fn fast_retries() -> RetryLayer {
    RetryLayer::new(
        RetryPolicy::binance()
            .with_max_retries(3)
            .with_retry_delay(|_: &FetchError, _: u32| Duration::from_millis(10)),
    )
}

async fn fetch(service: &HttpService, url: &str) -> Result<(StatusCode, String), FetchError> {
    let response = service
        .clone()
        .oneshot(ExchangeRequest::parse(url).unwrap())
        .await?;
    Ok((
        response.status(),
        String::from_utf8_lossy(response.body()).into_owned(),
    ))
}

#[tokio::test]
async fn test_retries_server_errors_until_success() {
    let mock = MockExchange::start(|call, _| match call {
        0 | 1 => MockResponse::new(500, r#"{"code":-1000}"#),
        _ => MockResponse::ok(r#"{"ok":true}"#),
    })
    .await;

    let service = compose(vec![
        decorator(TimeoutLayer::new(Duration::from_secs(2))),
        decorator(fast_retries()),
    ])(transport());

    let (status, body) = fetch(&service, &mock.url("/api/v3/ping")).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"ok":true}"#);
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock = MockExchange::always(MockResponse::new(400, r#"{"code":-1121}"#)).await;
    let service = compose(vec![decorator(fast_retries())])(transport());

    let err = fetch(&service, &mock.url("/api/v3/depth?symbol=NOPE"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_too_many_requests_honours_retry_after() {
    let mock = MockExchange::start(|call, _| match call {
        0 => MockResponse::new(429, "{}").with_header("Retry-After", "1"),
        _ => MockResponse::ok("{}"),
    })
    .await;

    let service = compose(vec![decorator(RetryLayer::new(RetryPolicy::binance()))])(transport());

    let start = Instant::now();
    fetch(&service, &mock.url("/api/v3/ping")).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_usage_headers_update_limiter() {
    let mock = MockExchange::always(
        MockResponse::ok("{}")
            .with_header("x-mbx-used-weight-1m", "1234")
            .with_header("x-mbx-order-count-10s", "7"),
    )
    .await;

    let layer = RateLimitLayer::new(default_quotas());
    let limiter = layer.limiter();
    let service = compose(vec![decorator(layer)])(transport());

    fetch(&service, &mock.url("/api/v3/depth?symbol=BTCUSDT&limit=100"))
        .await
        .unwrap();

    let usage = limiter.usage();
    assert_eq!(usage["request_weight"], 1234);
    assert_eq!(usage["orders_10s"], 7);
    assert_eq!(usage["raw_requests"], 1);
}

#[tokio::test]
async fn test_limiter_reconciles_error_responses() {
    let mock = MockExchange::always(
        MockResponse::new(503, "{}").with_header("x-mbx-used-weight-1m", "5999"),
    )
    .await;

    let limiter = std::sync::Arc::new(RateLimiter::new(default_quotas()));
    let service = compose(vec![decorator(RateLimitLayer::from_limiter(limiter.clone()))])(
        transport(),
    );

    let err = fetch(&service, &mock.url("/api/v3/ping")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(limiter.usage()["request_weight"], 5999);
}

#[tokio::test]
async fn test_slow_exchange_hits_deadline() {
    let mock = MockExchange::always(MockResponse::ok("{}").with_delay(Duration::from_millis(500))).await;
    let service =
        compose(vec![decorator(TimeoutLayer::new(Duration::from_millis(100)))])(transport());

    let start = Instant::now();
    let err = fetch(&service, &mock.url("/api/v3/ping")).await.unwrap_err();
    assert!(matches!(err, FetchError::Deadline(d) if d == Duration::from_millis(100)));
    assert!(start.elapsed() < Duration::from_millis(450));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let addr = closed_port().await;
    let service = compose(vec![decorator(fast_retries())])(transport());

    let err = fetch(&service, &format!("http://{addr}/api/v3/ping"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(NetworkErrorCode::ConnectionRefused));
    assert_eq!(err.kind(), "network");
}

#[tokio::test]
async fn test_breaker_stops_calling_failing_exchange() {
    let mock = MockExchange::always(MockResponse::new(500, "{}")).await;
    let breaker = CircuitBreakerLayer::new(CircuitBreakerConfig {
        failure_threshold: 2,
        reset_timeout: Duration::from_secs(30),
    });
    let service = compose(vec![decorator(breaker)])(transport());
    let url = mock.url("/api/v3/ping");

    for _ in 0..2 {
        let err = fetch(&service, &url).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }
    let err = fetch(&service, &url).await.unwrap_err();
    assert!(matches!(err, FetchError::CircuitOpen));
    assert_eq!(mock.calls(), 2);
}
