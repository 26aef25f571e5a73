//! Resilient request pipeline.
//!
//! # Data Flow
//! ```text
//! caller
//!     → [outermost decorator]
//!     → ...
//!     → concurrency.rs (bounded in-flight slots, FIFO queue)
//!     → transport.rs (reqwest)
//!     ← response / FetchError flows back up, updating each stage
//! ```
//!
//! Each stage is a `tower::Layer` producing a `tower::Service` over
//! [`ExchangeRequest`]. `compose` stacks type-erased [`Decorator`]s over a
//! base [`HttpService`]: the first decorator wraps the base directly and the
//! last one is what callers see.

pub mod backoff;
pub mod cancel;
pub mod circuit_breaker;
pub mod concurrency;
pub mod error;
pub mod rate_limit;
pub mod request;
pub mod retries;
pub mod timeouts;
pub mod transport;

use futures_util::future::BoxFuture;
use tower::util::{BoxCloneSyncService, BoxCloneSyncServiceLayer};
use tower::{Layer, Service};

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerLayer, CircuitStatus};
pub use concurrency::ConcurrencyLimitLayer;
pub use error::{FetchError, NetworkErrorCode};
pub use rate_limit::{QuotaConfig, QuotaKind, RateLimitLayer, RateLimiter};
pub use request::{ExchangeRequest, ExchangeResponse, RequestOptions};
pub use retries::{RetryLayer, RetryPolicy};
pub use timeouts::TimeoutLayer;
pub use transport::ReqwestTransport;

/// Future returned by every pipeline stage.
pub type ResponseFuture = BoxFuture<'static, Result<ExchangeResponse, FetchError>>;

/// A type-erased request function.
pub type HttpService = BoxCloneSyncService<ExchangeRequest, ExchangeResponse, FetchError>;

/// A type-erased decorator over [`HttpService`].
pub type Decorator = BoxCloneSyncServiceLayer<HttpService, ExchangeRequest, ExchangeResponse, FetchError>;

/// Erase a concrete service into an [`HttpService`].
pub fn boxed<S>(service: S) -> HttpService
where
    S: Service<ExchangeRequest, Response = ExchangeResponse, Error = FetchError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// Erase a concrete layer into a [`Decorator`].
pub fn decorator<L>(layer: L) -> Decorator
where
    L: Layer<HttpService> + Send + Sync + 'static,
    L::Service: Service<ExchangeRequest, Response = ExchangeResponse, Error = FetchError>
        + Clone
        + Send
        + Sync
        + 'static,
    <L::Service as Service<ExchangeRequest>>::Future: Send + 'static,
{
    BoxCloneSyncServiceLayer::new(layer)
}

/// Build `d_n(...d_2(d_1(base)))` from `[d_1, ..., d_n]`.
///
/// Construction only: nothing is sent until the returned service is called.
pub fn compose(decorators: Vec<Decorator>) -> impl Fn(HttpService) -> HttpService {
    move |base| {
        decorators
            .iter()
            .fold(base, |service, decorator| decorator.layer(service))
    }
}

/// Clone `inner` for a new call, leaving a ready clone behind.
///
/// Services are cloned per call so the future owns its handle; the clone
/// left in place has not been driven to readiness.
pub(crate) fn take_inner<S: Clone>(inner: &mut S) -> S {
    let clone = inner.clone();
    std::mem::replace(inner, clone)
}
