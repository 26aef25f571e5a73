//! Timeout enforcement.
//!
//! # Responsibilities
//! - Attach a deadline to every call
//! - Merge the deadline with the caller's cancellation signals
//! - Release the timer and listeners on every exit path
//!
//! # Design Decisions
//! - Uses Tokio's timer; the sleep future is dropped with the call
//! - Deadline and caller cancellation are distinct errors
//! - The merged signal replaces the options signal for the inner call

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service, ServiceExt};

use crate::resilience::cancel::MergedSignal;
use crate::resilience::{take_inner, ExchangeRequest, ExchangeResponse, FetchError, ResponseFuture};

/// Fails calls that do not settle within `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<ExchangeRequest> for TimeoutService<S>
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

    fn call(&mut self, mut request: ExchangeRequest) -> Self::Future {
        let inner = take_inner(&mut self.inner);
        let timeout = self.timeout;

        Box::pin(async move {
            let merged = MergedSignal::new(request.signals());
            if merged.is_fired() {
                return Err(FetchError::Cancelled);
            }
            request.options_mut().signal = Some(merged.token());

            let deadline = tokio::time::sleep(timeout);
            tokio::select! {
                biased;
                _ = merged.source_fired() => Err(FetchError::Cancelled),
                _ = deadline => {
                    merged.fire();
                    tracing::warn!(
                        target = %request.target(),
                        timeout_ms = timeout.as_millis() as u64,
                        "Request deadline exceeded"
                    );
                    Err(FetchError::Deadline(timeout))
                }
                result = inner.oneshot(request.clone()) => result,
            }
        })
    }
}
