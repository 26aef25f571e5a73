//! Metrics collection and exposition.
//!
//! # Metrics
//! - `exchange_requests_total` (counter): exchange calls by outcome
//! - `exchange_retries_total` (counter): retries by failure kind
//! - `exchange_rate_limit_waits_total` (counter): throttle waits by quota
//! - `exchange_quota_usage` (gauge): current window count by quota
//! - `exchange_circuit_open_total` (counter): breaker trips
//! - `exchange_inflight_requests` / `exchange_queued_requests` (gauges)
//! - `orderbook_cache_total` (counter): cache lookups by result
//! - `route_requests_total` (counter): route calls by kind and status
//! - `route_request_duration_seconds` (histogram): route latency

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_exchange_request(outcome: &'static str) {
    counter!("exchange_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_retry(reason: &'static str) {
    counter!("exchange_retries_total", "reason" => reason).increment(1);
}

pub fn record_rate_limit_wait(quota: &str) {
    counter!("exchange_rate_limit_waits_total", "quota" => quota.to_owned()).increment(1);
}

pub fn set_quota_usage(quota: &str, count: u64) {
    gauge!("exchange_quota_usage", "quota" => quota.to_owned()).set(count as f64);
}

pub fn record_circuit_open() {
    counter!("exchange_circuit_open_total").increment(1);
}

pub fn set_inflight_requests(count: usize) {
    gauge!("exchange_inflight_requests").set(count as f64);
}

pub fn set_queued_requests(count: usize) {
    gauge!("exchange_queued_requests").set(count as f64);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("orderbook_cache_total", "result" => result).increment(1);
}

pub fn record_route(kind: &'static str, status: u16, start: Instant) {
    counter!("route_requests_total", "kind" => kind, "status" => status.to_string())
        .increment(1);
    histogram!("route_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}
