//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Validate route queries and dispatch them to the route engine
//! - Serve until the shutdown coordinator fires

use std::future::Future;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::request::{make_span, propagate_request_id, set_request_id};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::quoting::{RouteEngine, RouteQuery, RouteResult};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: RouteEngine,
}

/// HTTP server for the route API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, engine: RouteEngine) -> Self {
        let router = build_router(config, AppState { engine });
        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves, then drain.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &ServerConfig, state: AppState) -> Router {
    Router::new()
        .route("/api/route", get(route_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(set_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(propagate_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_secs,
                ))),
        )
}

async fn route_handler(
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<Value>, ApiError> {
    let start = Instant::now();

    let order = match query.into_order() {
        Ok(order) => order,
        Err(details) => {
            let error = ApiError::Validation(details);
            metrics::record_route("invalid", error.status().as_u16(), start);
            return Err(error);
        }
    };
    let kind = order.kind().as_str();

    match state.engine.compute_route(&order).await {
        Ok(result) => {
            metrics::record_route(kind, 200, start);
            Ok(Json(success_body(&result)))
        }
        Err(err) => {
            let error = ApiError::from(err);
            tracing::warn!(kind, status = error.status().as_u16(), "Route request failed");
            metrics::record_route(kind, error.status().as_u16(), start);
            Err(error)
        }
    }
}

fn success_body(result: &RouteResult) -> Value {
    json!({ "success": true, "result": result })
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let exchanges: Vec<&str> = state
        .engine
        .registry()
        .clients()
        .map(|client| client.name())
        .collect();
    Json(json!({ "status": "ok", "exchanges": exchanges }))
}
