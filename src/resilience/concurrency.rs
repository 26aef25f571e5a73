//! Concurrency limiting.
//!
//! # Responsibilities
//! - Bound the number of calls in flight
//! - Queue the rest and dispatch them in arrival order
//! - Drop queued calls whose caller cancels before dispatch
//!
//! # Design Decisions
//! - A fair Tokio semaphore is the queue; permits are handed out FIFO
//! - The permit lives in the call future, so every exit path frees the slot
//! - Queue depth is unbounded; callers bound it with a timeout outside

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service, ServiceExt};

use crate::observability::metrics;
use crate::resilience::cancel::any_cancelled;
use crate::resilience::{take_inner, ExchangeRequest, ExchangeResponse, FetchError, ResponseFuture};

/// Slot budget shared by every service built from one layer.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Take a slot, waiting in line if none is free.
    ///
    /// Fails with `Cancelled` if any of `signals` fires while queued; the
    /// abandoned place in line is released with the future.
    async fn acquire(
        &self,
        signals: &[CancellationToken],
    ) -> Result<OwnedSemaphorePermit, FetchError> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(permit);
        }

        let _waiting = QueueSlot::enter(self);
        tokio::select! {
            biased;
            _ = any_cancelled(signals) => Err(FetchError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                // The semaphore is never closed.
                permit.map_err(|_| FetchError::Cancelled)
            }
        }
    }
}

/// Counts a call as queued for as long as it is held.
struct QueueSlot<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl<'a> QueueSlot<'a> {
    fn enter(limiter: &'a ConcurrencyLimiter) -> Self {
        let depth = limiter.queued.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::set_queued_requests(depth);
        Self { limiter }
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        let depth = self.limiter.queued.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_queued_requests(depth);
    }
}

/// Bounds calls in flight through a shared [`ConcurrencyLimiter`].
#[derive(Debug, Clone)]
pub struct ConcurrencyLimitLayer {
    limiter: Arc<ConcurrencyLimiter>,
}

impl ConcurrencyLimitLayer {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            limiter: Arc::new(ConcurrencyLimiter::new(max_concurrent)),
        }
    }

    pub fn limiter(&self) -> Arc<ConcurrencyLimiter> {
        Arc::clone(&self.limiter)
    }
}

impl<S> Layer<S> for ConcurrencyLimitLayer {
    type Service = ConcurrencyLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConcurrencyLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConcurrencyLimitService<S> {
    inner: S,
    limiter: Arc<ConcurrencyLimiter>,
}

impl<S> Service<ExchangeRequest> for ConcurrencyLimitService<S>
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
            let signals = request.signals();
            let permit = limiter.acquire(&signals).await?;
            metrics::set_inflight_requests(limiter.in_flight());

            let result = inner.oneshot(request).await;

            drop(permit);
            metrics::set_inflight_requests(limiter.in_flight());
            result
        })
    }
}
