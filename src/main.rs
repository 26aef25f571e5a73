//! Exchange order router (v1)
//!
//! Routes buy, sell, and swap orders to the best prices available on
//! the registered exchanges.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ quoting engine ──▶ exchange registry
//!                     (request id,    (validate, fill)        │
//!                      trace, timeout)                        ▼
//!                                                     binance client
//!                                                     (TTL cache)
//!                                                             │
//!                                                             ▼
//!                            ┌──────────────── request pipeline ───────────────┐
//!                            │ breaker → retry → rate limit → timeout → limit │──▶ Binance
//!                            └────────────────────────────────────────────────┘
//!
//!     Cross-cutting: config, observability (logs + Prometheus), lifecycle
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use exchange_router::config::{load_config, RouterConfig};
use exchange_router::exchange::{BinanceClient, ExchangeRegistry};
use exchange_router::http::HttpServer;
use exchange_router::lifecycle::{listen_for_signals, Shutdown};
use exchange_router::observability::{logging, metrics};
use exchange_router::quoting::RouteEngine;

#[derive(Parser)]
#[command(name = "exchange-router")]
#[command(about = "Best-execution order router", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("exchange-router v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.server.bind_address,
        exchange = %config.exchange.base_url,
        timeout_ms = config.pipeline.timeout_ms,
        retry = config.pipeline.retry.enabled,
        rate_limit = config.pipeline.rate_limit.enabled,
        circuit_breaker = config.pipeline.circuit_breaker.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    listen_for_signals(shutdown.clone());

    let binance = BinanceClient::from_config(&config)?;
    let sweeper = binance
        .cache()
        .spawn_sweeper(config.cache.sweep_interval(), shutdown.subscribe());

    let registry = ExchangeRegistry::new().with(Arc::new(binance));
    let engine = RouteEngine::new(registry);

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config.server, engine);
    server.run(listener, shutdown.wait()).await?;

    shutdown.trigger();
    let _ = sweeper.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
