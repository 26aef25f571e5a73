//! Circuit breaking.
//!
//! # Responsibilities
//! - Count consecutive failures of the wrapped service
//! - Fail fast while the exchange is known to be unhealthy
//! - Close again after a cool-down
//!
//! # Design Decisions
//! - Two states only; the first call after the cool-down runs as a closed call
//! - Success decrements the failure count instead of clearing it
//! - Non-ok responses count as failures even when returned as `Ok`

use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

use crate::observability::metrics;
use crate::resilience::{take_inner, ExchangeRequest, ExchangeResponse, FetchError, ResponseFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
}

#[derive(Debug)]
struct CircuitState {
    status: CircuitStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Shared breaker state for one exchange client.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CircuitState {
                status: CircuitStatus::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn status(&self) -> CircuitStatus {
        self.lock().status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Admit or reject a call, closing the circuit if the cool-down is over.
    fn try_admit(&self, now: Instant) -> Result<(), FetchError> {
        let mut state = self.lock();
        if state.status == CircuitStatus::Closed {
            return Ok(());
        }

        let cooled = state
            .opened_at
            .is_some_and(|opened| now.saturating_duration_since(opened) >= self.config.reset_timeout);
        if !cooled {
            return Err(FetchError::CircuitOpen);
        }

        state.status = CircuitStatus::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        tracing::info!("Circuit closed after cool-down");
        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_sub(1);
    }

    fn record_failure(&self, now: Instant) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.status == CircuitStatus::Closed
            && state.consecutive_failures >= self.config.failure_threshold
        {
            state.status = CircuitStatus::Open;
            state.opened_at = Some(now);
            tracing::warn!(
                failures = state.consecutive_failures,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit opened"
            );
            metrics::record_circuit_open();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wraps services with a shared [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(config)),
        }
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S> Service<ExchangeRequest> for CircuitBreakerService<S>
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
        let breaker = Arc::clone(&self.breaker);

        Box::pin(async move {
            // The cool-down runs from when the failing call was admitted.
            let started = Instant::now();
            breaker.try_admit(started)?;

            let result = inner.oneshot(request).await;
            match &result {
                Ok(response) if response.is_ok() => breaker.record_success(),
                _ => breaker.record_failure(started),
            }
            result
        })
    }
}
