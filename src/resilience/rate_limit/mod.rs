//! Client-side rate limiting.
//!
//! # Responsibilities
//! - Track usage per quota in fixed windows
//! - Delay calls that would overflow a quota until its window resets
//! - Resynchronise counters from server-reported usage headers
//!
//! # Design Decisions
//! - One limiter holds every window; services produced by a layer share it
//! - Window state sits behind a std mutex that is never held across `.await`
//! - After any throttle wait every window is reset, not just the one waited on
//! - Delays never reorder calls and never become errors

mod headers;
mod quota;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};
use url::Url;

use crate::observability::metrics;
use crate::resilience::cancel::any_cancelled;
use crate::resilience::{take_inner, ExchangeRequest, ExchangeResponse, FetchError, ResponseFuture};

pub use headers::{parse_usage_headers, UsageReport};
pub use quota::{binance_cost, default_quotas, CostModel, QuotaConfig, QuotaKind};

use quota::WindowState;

/// Cost of one request against each quota, keyed like the quotas.
pub type CostVector = BTreeMap<String, u64>;

/// Fixed-window counters for a set of named quotas.
pub struct RateLimiter {
    quotas: BTreeMap<String, QuotaConfig>,
    windows: Mutex<BTreeMap<String, WindowState>>,
    cost_model: CostModel,
}

impl RateLimiter {
    /// Limiter over `quotas` using the Binance cost model.
    pub fn new(quotas: BTreeMap<String, QuotaConfig>) -> Self {
        let now = Instant::now();
        let windows = quotas
            .keys()
            .map(|key| (key.clone(), WindowState::fresh(now)))
            .collect();

        Self {
            quotas,
            windows: Mutex::new(windows),
            cost_model: Arc::new(binance_cost),
        }
    }

    /// Binance defaults with `overrides` replacing or extending them by key.
    pub fn with_overrides(overrides: BTreeMap<String, QuotaConfig>) -> Self {
        let mut quotas = default_quotas();
        quotas.extend(overrides);
        Self::new(quotas)
    }

    pub fn with_cost_model<F>(mut self, cost_model: F) -> Self
    where
        F: Fn(&Url, QuotaKind) -> u64 + Send + Sync + 'static,
    {
        self.cost_model = Arc::new(cost_model);
        self
    }

    pub fn quotas(&self) -> &BTreeMap<String, QuotaConfig> {
        &self.quotas
    }

    /// Cost of a request to `target` against every quota.
    pub fn cost_vector(&self, target: &Url) -> CostVector {
        self.quotas
            .iter()
            .map(|(key, quota)| (key.clone(), (self.cost_model)(target, quota.kind)))
            .collect()
    }

    /// Reset expired windows, then return the longest wait any quota needs
    /// before `costs` fits, with the quota that imposes it.
    pub fn throttle_delay(&self, costs: &CostVector, now: Instant) -> Option<(String, Duration)> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut longest: Option<(String, Duration)> = None;

        for (key, quota) in &self.quotas {
            let window = windows
                .entry(key.clone())
                .or_insert_with(|| WindowState::fresh(now));
            window.reset_if_expired(quota.interval(), now);

            let cost = costs.get(key).copied().unwrap_or(0);
            let excess = window.excess_delay(cost, quota, now);
            if excess > longest.as_ref().map_or(Duration::ZERO, |(_, delay)| *delay) {
                longest = Some((key.clone(), excess));
            }
        }

        longest
    }

    /// Start a fresh window for every quota.
    pub fn reset_all(&self, now: Instant) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        for key in self.quotas.keys() {
            windows.insert(key.clone(), WindowState::fresh(now));
        }
    }

    /// Fold a completed call into the counters.
    ///
    /// Server-reported usage overwrites the count of every quota whose kind
    /// and interval match; other quotas grow by their cost.
    pub fn reconcile(&self, costs: &CostVector, headers: Option<&HeaderMap>) {
        let reports = headers.map(parse_usage_headers).unwrap_or_default();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        for (key, quota) in &self.quotas {
            let Some(window) = windows.get_mut(key) else {
                continue;
            };

            let reported = quota.kind.is_server_reported().then(|| {
                reports
                    .iter()
                    .find(|r| r.kind == quota.kind && r.interval == quota.interval())
                    .map(|r| r.count)
            });

            window.count = match reported.flatten() {
                Some(count) => count,
                None => window
                    .count
                    .saturating_add(costs.get(key).copied().unwrap_or(0)),
            };
            metrics::set_quota_usage(key, window.count);
        }
    }

    /// Current count per quota.
    pub fn usage(&self) -> BTreeMap<String, u64> {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows
            .iter()
            .map(|(key, window)| (key.clone(), window.count))
            .collect()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("quotas", &self.quotas)
            .field("usage", &self.usage())
            .finish_non_exhaustive()
    }
}

/// Throttles calls against a shared [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(quotas: BTreeMap<String, QuotaConfig>) -> Self {
        Self::from_limiter(Arc::new(RateLimiter::new(quotas)))
    }

    /// Binance's published spot limits.
    pub fn binance_defaults() -> Self {
        Self::new(default_quotas())
    }

    pub fn from_limiter(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<ExchangeRequest> for RateLimitService<S>
where
    S: Service<ExchangeRequest, Response = ExchangeResponse, Error = FetchError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ExchangeResponse;
    type Error = FetchError;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ExchangeRequest) -> Self::Future {
        let inner = take_inner(&mut self.inner);
        let limiter = Arc::clone(&self.limiter);

        Box::pin(async move {
            let costs = limiter.cost_vector(request.target());

            if let Some((quota, delay)) = limiter.throttle_delay(&costs, Instant::now()) {
                tracing::warn!(
                    quota = %quota,
                    delay_ms = delay.as_millis() as u64,
                    target = %request.target(),
                    "Rate limit reached, delaying request"
                );
                metrics::record_rate_limit_wait(&quota);

                let signals = request.signals();
                tokio::select! {
                    biased;
                    _ = any_cancelled(&signals) => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                limiter.reset_all(Instant::now());
            }

            let charge = PendingCharge::new(Arc::clone(&limiter), costs);
            let result = inner.oneshot(request).await;
            let headers = match &result {
                Ok(response) => Some(response.headers()),
                Err(error) => error.headers(),
            };
            charge.settle(headers);
            result
        })
    }
}

/// Charges a dispatched call against the limiter exactly once.
///
/// A call dropped while in flight may already be on the wire, so it is
/// charged its estimated cost.
struct PendingCharge {
    limiter: Arc<RateLimiter>,
    costs: Option<CostVector>,
}

impl PendingCharge {
    fn new(limiter: Arc<RateLimiter>, costs: CostVector) -> Self {
        Self {
            limiter,
            costs: Some(costs),
        }
    }

    fn settle(mut self, headers: Option<&HeaderMap>) {
        if let Some(costs) = self.costs.take() {
            self.limiter.reconcile(&costs, headers);
        }
    }
}

impl Drop for PendingCharge {
    fn drop(&mut self) {
        if let Some(costs) = self.costs.take() {
            self.limiter.reconcile(&costs, None);
        }
    }
}
