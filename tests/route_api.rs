//! The route API end to end: HTTP server, engine, Binance client, mock exchange.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockExchange, MockResponse, DEPTH_BODY};
use exchange_router::config::{CacheConfig, ExchangeConfig, PipelineConfig, ServerConfig};
use exchange_router::exchange::{BinanceClient, ExchangeRegistry};
use exchange_router::quoting::RouteEngine;
use exchange_router::resilience::{boxed, ReqwestTransport};
use exchange_router::{HttpServer, Shutdown};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Running {
    base: String,
    shutdown: Shutdown,
    server: JoinHandle<Result<(), std::io::Error>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server did not drain")
            .unwrap()
            .unwrap();
    }
}

async fn start_router(exchange: &MockExchange, pipeline: PipelineConfig) -> Running {
    let client = BinanceClient::new(
        &ExchangeConfig {
            base_url: exchange.url("/"),
            ..ExchangeConfig::default()
        },
        &pipeline,
        &CacheConfig::default(),
        boxed(ReqwestTransport::with_defaults().unwrap()),
    )
    .unwrap();
    let engine = RouteEngine::new(ExchangeRegistry::new().with(Arc::new(client)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = Shutdown::new();
    let server = tokio::spawn(
        HttpServer::new(&ServerConfig::default(), engine).run(listener, shutdown.wait()),
    );

    Running {
        base,
        shutdown,
        server,
    }
}

async fn get(url: String) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

fn no_retries() -> PipelineConfig {
    let mut pipeline = PipelineConfig::default();
    pipeline.retry.enabled = false;
    pipeline
}

#[tokio::test]
async fn test_buy_route_end_to_end() {
    let exchange = MockExchange::always(MockResponse::ok(DEPTH_BODY)).await;
    let router = start_router(&exchange, PipelineConfig::default()).await;

    let (status, body) = get(format!(
        "{}/api/route?kind=buy&receiveAsset=BTC&payAsset=USD&volume=2",
        router.base
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let trades = body["result"]["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0]["price"], 100.0);
    assert_eq!(trades[1]["volume"], 1.0);
    assert_eq!(body["result"]["totalPayCost"], 201.0);
    assert_eq!(body["result"]["averagePrice"], 100.5);

    let targets = exchange.targets();
    assert_eq!(targets, vec!["/api/v3/depth?symbol=BTCUSDT&limit=100".to_string()]);

    router.stop().await;
}

#[tokio::test]
async fn test_repeat_route_is_served_from_cache() {
    let exchange = MockExchange::always(MockResponse::ok(DEPTH_BODY)).await;
    let router = start_router(&exchange, PipelineConfig::default()).await;
    let url = format!(
        "{}/api/route?kind=sell&receiveAsset=USD&payAsset=BTC&volume=100",
        router.base
    );

    let (first, _) = get(url.clone()).await;
    let (second, body) = get(url).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["result"]["totalPayCost"], 50.0);
    assert_eq!(exchange.calls(), 1);

    router.stop().await;
}

#[tokio::test]
async fn test_validation_errors_are_reported_per_field() {
    let exchange = MockExchange::always(MockResponse::ok(DEPTH_BODY)).await;
    let router = start_router(&exchange, PipelineConfig::default()).await;

    let (status, body) = get(format!("{}/api/route?kind=lend&volume=abc", router.base)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"kind"));
    assert!(fields.contains(&"receiveAsset"));
    assert!(fields.contains(&"payAsset"));
    assert!(fields.contains(&"volume"));
    assert_eq!(exchange.calls(), 0);

    router.stop().await;
}

#[tokio::test]
async fn test_thin_book_is_unprocessable() {
    let exchange = MockExchange::always(MockResponse::ok(DEPTH_BODY)).await;
    let router = start_router(&exchange, PipelineConfig::default()).await;

    let (status, body) = get(format!(
        "{}/api/route?kind=buy&receiveAsset=BTC&payAsset=USD&volume=1000",
        router.base
    ))
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Insufficient liquidity to fulfill order");

    router.stop().await;
}

#[tokio::test]
async fn test_exchange_failure_is_bad_gateway() {
    let exchange = MockExchange::always(MockResponse::new(500, "{}")).await;
    let router = start_router(&exchange, no_retries()).await;

    let (status, body) = get(format!(
        "{}/api/route?kind=swap&receiveAsset=ETH&payAsset=BTC&volume=1",
        router.base
    ))
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Upstream exchange request failed");
    assert_eq!(exchange.targets()[0], "/api/v3/depth?symbol=ETHBTC&limit=100");

    router.stop().await;
}

#[tokio::test]
async fn test_open_circuit_is_service_unavailable() {
    let exchange = MockExchange::always(MockResponse::new(500, "{}")).await;
    let mut pipeline = no_retries();
    pipeline.circuit_breaker.enabled = true;
    pipeline.circuit_breaker.failure_threshold = 1;
    let router = start_router(&exchange, pipeline).await;
    let url = format!(
        "{}/api/route?kind=buy&receiveAsset=BTC&payAsset=USD&volume=1",
        router.base
    );

    let (first, _) = get(url.clone()).await;
    let (second, body) = get(url).await;
    assert_eq!(first, StatusCode::BAD_GATEWAY);
    assert_eq!(second, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Exchange temporarily unavailable");
    assert_eq!(exchange.calls(), 1);

    router.stop().await;
}

#[tokio::test]
async fn test_health_names_registered_exchanges() {
    let exchange = MockExchange::always(MockResponse::ok(DEPTH_BODY)).await;
    let router = start_router(&exchange, PipelineConfig::default()).await;

    let (status, body) = get(format!("{}/health", router.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["exchanges"][0], "binance");

    router.stop().await;
}
