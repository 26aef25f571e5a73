//! Binance spot REST client.
//!
//! # Responsibilities
//! - Map asset pairs to Binance symbols
//! - Serve order books from the TTL cache when fresh
//! - Fetch depth snapshots through the resilient request pipeline
//!
//! # Design Decisions
//! - One pipeline (and so one set of limiter/breaker state) per client
//! - Non-ok responses that reach the client are treated as failures

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tower::ServiceExt;
use url::Url;

use crate::cache::TtlCache;
use crate::config::{CacheConfig, ExchangeConfig, PipelineConfig, RouterConfig};
use crate::exchange::types::{DepthSnapshot, ExchangeError, OrderBook};
use crate::exchange::ExchangeClient;
use crate::observability::metrics;
use crate::resilience::retries::binance_retry_delay_from;
use crate::resilience::{
    boxed, compose, decorator, CircuitBreakerLayer, ConcurrencyLimitLayer, Decorator,
    ExchangeRequest, FetchError, HttpService, RateLimitLayer, RateLimiter, ReqwestTransport,
    RetryLayer, RetryPolicy, TimeoutLayer,
};

/// Binance symbol for buying `receive` with `pay`.
pub fn normalize_symbol(receive: &str, pay: &str) -> String {
    match (receive, pay) {
        ("BTC", "USD") => "BTCUSDT".to_string(),
        ("BTC", "ETH") | ("ETH", "BTC") => "ETHBTC".to_string(),
        _ => format!("{receive}{pay}"),
    }
}

/// Cache key for a depth snapshot.
pub fn cache_key(symbol: &str, limit: u32) -> String {
    format!("orderbook:{symbol}:{limit}")
}

/// Decorators for the Binance pipeline, innermost first.
pub fn pipeline_decorators(config: &PipelineConfig) -> Vec<Decorator> {
    let mut decorators = Vec::new();

    if let Some(max) = config.max_concurrent {
        decorators.push(decorator(ConcurrencyLimitLayer::new(max)));
    }

    decorators.push(decorator(TimeoutLayer::new(config.timeout())));

    if config.rate_limit.enabled {
        let limiter = RateLimiter::with_overrides(config.rate_limit.quotas.clone());
        decorators.push(decorator(RateLimitLayer::from_limiter(limiter.into())));
    }

    if config.retry.enabled {
        let policy = RetryPolicy::binance()
            .with_max_retries(config.retry.max_retries)
            .with_retry_delay(binance_retry_delay_from(Duration::from_millis(
                config.retry.base_delay_ms,
            )))
            .with_max_delay(Duration::from_millis(config.retry.max_delay_ms));
        decorators.push(decorator(RetryLayer::new(policy)));
    }

    if config.circuit_breaker.enabled {
        decorators.push(decorator(CircuitBreakerLayer::new(
            config.circuit_breaker.to_config(),
        )));
    }

    decorators
}

/// Order book client for Binance spot.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: Url,
    depth_limit: u32,
    service: HttpService,
    cache: TtlCache<String, OrderBook>,
}

impl BinanceClient {
    /// Client over `base`, wrapped in the pipeline described by `pipeline`.
    pub fn new(
        exchange: &ExchangeConfig,
        pipeline: &PipelineConfig,
        cache: &CacheConfig,
        base: HttpService,
    ) -> Result<Self, ExchangeError> {
        let base_url = Url::parse(&exchange.base_url)?;
        let service = compose(pipeline_decorators(pipeline))(base);

        Ok(Self {
            base_url,
            depth_limit: exchange.depth_limit,
            service,
            cache: TtlCache::new(cache.ttl()),
        })
    }

    /// Client over a pooled reqwest transport.
    pub fn from_config(config: &RouterConfig) -> Result<Self, ExchangeError> {
        let transport = ReqwestTransport::with_defaults()?;
        Self::new(
            &config.exchange,
            &config.pipeline,
            &config.cache,
            boxed(transport),
        )
    }

    pub fn cache(&self) -> &TtlCache<String, OrderBook> {
        &self.cache
    }

    pub fn depth_limit(&self) -> u32 {
        self.depth_limit
    }

    fn depth_url(&self, symbol: &str, limit: u32) -> Result<Url, ExchangeError> {
        let mut url = self.base_url.join("/api/v3/depth")?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    /// Depth snapshot for `symbol`, served from cache when fresh.
    pub async fn order_book_for_symbol(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<OrderBook, ExchangeError> {
        let key = cache_key(symbol, limit);
        if let Some(book) = self.cache.get(&key) {
            tracing::debug!(key = %key, "Order book cache hit");
            metrics::record_cache_lookup(true);
            return Ok(book);
        }
        tracing::debug!(key = %key, "Order book cache miss, fetching from exchange");
        metrics::record_cache_lookup(false);

        let request = ExchangeRequest::new(self.depth_url(symbol, limit)?);
        let response = match self.service.clone().oneshot(request).await {
            Ok(response) if response.is_ok() => response,
            Ok(response) => {
                metrics::record_exchange_request("http");
                return Err(FetchError::Http {
                    status: response.status(),
                    headers: response.headers().clone(),
                }
                .into());
            }
            Err(error) => {
                tracing::warn!(symbol, error = %error, "Order book request failed");
                metrics::record_exchange_request(error.kind());
                return Err(error.into());
            }
        };
        metrics::record_exchange_request("ok");

        let snapshot: DepthSnapshot = response.json()?;
        let book = OrderBook::try_from(snapshot)?;
        self.cache.insert(key, book.clone());
        Ok(book)
    }
}

impl fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url.as_str())
            .field("depth_limit", &self.depth_limit)
            .field("cache_ttl", &self.cache.ttl())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    fn order_book<'a>(
        &'a self,
        receive: &'a str,
        pay: &'a str,
    ) -> BoxFuture<'a, Result<OrderBook, ExchangeError>> {
        Box::pin(async move {
            let symbol = normalize_symbol(receive, pay);
            self.order_book_for_symbol(&symbol, self.depth_limit()).await
        })
    }
}
