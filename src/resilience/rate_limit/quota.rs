//! Quota definitions, window state and the Binance cost model.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use url::Url;

/// What a quota counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotaKind {
    /// Request weight, reported by `x-mbx-used-weight-*`.
    RequestWeight,
    /// Order count, reported by `x-mbx-order-count-*`.
    Orders,
    /// Raw request count, never reported; tracked locally.
    RawRequests,
}

impl QuotaKind {
    /// Whether the exchange reports usage for this kind in response headers.
    pub fn is_server_reported(self) -> bool {
        !matches!(self, Self::RawRequests)
    }
}

/// A time-boxed budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub limit: u64,
    pub interval_ms: u64,
    pub kind: QuotaKind,
}

impl QuotaConfig {
    pub const fn new(limit: u64, interval: Duration, kind: QuotaKind) -> Self {
        Self {
            limit,
            interval_ms: interval.as_millis() as u64,
            kind,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Binance's published spot limits.
pub fn default_quotas() -> BTreeMap<String, QuotaConfig> {
    BTreeMap::from([
        (
            "request_weight".to_string(),
            QuotaConfig::new(6000, MINUTE, QuotaKind::RequestWeight),
        ),
        (
            "orders_10s".to_string(),
            QuotaConfig::new(100, Duration::from_secs(10), QuotaKind::Orders),
        ),
        (
            "orders_1d".to_string(),
            QuotaConfig::new(200_000, DAY, QuotaKind::Orders),
        ),
        (
            "raw_requests".to_string(),
            QuotaConfig::new(61_000, 5 * MINUTE, QuotaKind::RawRequests),
        ),
    ])
}

/// Per-kind cost of a request.
pub type CostModel = Arc<dyn Fn(&Url, QuotaKind) -> u64 + Send + Sync>;

/// Binance cost estimate.
///
/// Depth costs 5 weight up to `limit=100` and 25 above; order endpoints
/// cost one order; everything costs one raw request.
pub fn binance_cost(target: &Url, kind: QuotaKind) -> u64 {
    let path = target.path();
    match kind {
        QuotaKind::RequestWeight if path.contains("/api/v3/depth") => {
            let limit = target
                .query_pairs()
                .find(|(key, _)| key == "limit")
                .and_then(|(_, value)| value.parse::<u64>().ok())
                .unwrap_or(0);
            if limit <= 100 {
                5
            } else {
                25
            }
        }
        QuotaKind::RequestWeight => 1,
        QuotaKind::Orders if path.contains("/api/v3/order") => 1,
        QuotaKind::Orders => 0,
        QuotaKind::RawRequests => 1,
    }
}

/// Counter for one quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowState {
    pub count: u64,
    pub window_start: Instant,
}

impl WindowState {
    pub fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Reset once the whole interval has elapsed since the window opened.
    pub fn reset_if_expired(&mut self, interval: Duration, now: Instant) {
        if now.saturating_duration_since(self.window_start) >= interval {
            *self = Self::fresh(now);
        }
    }

    /// Time until the window resets, if `cost` would overflow `limit`.
    pub fn excess_delay(&self, cost: u64, quota: &QuotaConfig, now: Instant) -> Duration {
        if self.count.saturating_add(cost) > quota.limit {
            quota
                .interval()
                .saturating_sub(now.saturating_duration_since(self.window_start))
        } else {
            Duration::ZERO
        }
    }
}
