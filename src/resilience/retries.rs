//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failure is retryable
//! - Compute the delay before the next attempt
//! - Re-issue the call sequentially until it succeeds or the budget is spent
//!
//! # Design Decisions
//! - Attempts start at 1; `max_retries = 3` allows four attempts
//! - Exhaustion surfaces the last underlying error unchanged
//! - Server retry hints win over the exponential schedule
//! - No jitter

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use reqwest::StatusCode;
use tower::{Layer, Service, ServiceExt};

use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, DEFAULT_BASE_DELAY};
use crate::resilience::cancel::any_cancelled;
use crate::resilience::{take_inner, ExchangeRequest, ExchangeResponse, FetchError, ResponseFuture};

type RetryPredicate = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;
type RetryDelay = Arc<dyn Fn(&FetchError, u32) -> Duration + Send + Sync>;

/// When and how long to wait before re-issuing a failed call.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    is_retryable: RetryPredicate,
    retry_delay: RetryDelay,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Policy with the given classifier, 3 retries, 200ms exponential backoff
    /// and a 30s cap.
    pub fn new<F>(is_retryable: F) -> Self
    where
        F: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        Self {
            max_retries: 3,
            is_retryable: Arc::new(is_retryable),
            retry_delay: Arc::new(|_, attempt| calculate_backoff(attempt, DEFAULT_BASE_DELAY)),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Binance classification: 429, 418, 5xx and transient network failures.
    pub fn binance() -> Self {
        Self::new(is_binance_retryable)
            .with_retry_delay(binance_retry_delay)
            .with_max_delay(Duration::from_secs(60))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay<F>(mut self, retry_delay: F) -> Self
    where
        F: Fn(&FetchError, u32) -> Duration + Send + Sync + 'static,
    {
        self.retry_delay = Arc::new(retry_delay);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether `attempt` (1-based) may be followed by another one.
    pub fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        attempt <= self.max_retries && (self.is_retryable)(error)
    }

    /// Delay before the attempt following `attempt`, capped at `max_delay`.
    pub fn delay_for(&self, error: &FetchError, attempt: u32) -> Duration {
        (self.retry_delay)(error, attempt).min(self.max_delay)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

/// Retryable iff status is 429, 418 or >= 500, or a timeout/reset.
pub fn is_binance_retryable(error: &FetchError) -> bool {
    match error.status() {
        Some(status) => {
            status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::IM_A_TEAPOT
                || status.as_u16() >= 500
        }
        None => error.code().is_some_and(|code| code.is_transient()),
    }
}

/// `Retry-After` seconds for 429/418 (default 1s), exponential otherwise.
pub fn binance_retry_delay(error: &FetchError, attempt: u32) -> Duration {
    binance_retry_delay_from(DEFAULT_BASE_DELAY)(error, attempt)
}

/// [`binance_retry_delay`] with a custom exponential base.
pub fn binance_retry_delay_from(
    base: Duration,
) -> impl Fn(&FetchError, u32) -> Duration + Send + Sync + Clone + 'static {
    move |error: &FetchError, attempt: u32| match error.status() {
        Some(StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT) => {
            error.retry_after().unwrap_or(Duration::from_secs(1))
        }
        _ => calculate_backoff(attempt, base),
    }
}

/// Re-issues failed calls according to a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<ExchangeRequest> for RetryService<S>
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
        let policy = self.policy.clone();

        Box::pin(async move {
            let signals = request.signals();
            let mut attempt = 1;

            loop {
                let error = match inner.clone().oneshot(request.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(error) => error,
                };

                if !policy.should_retry(&error, attempt) {
                    return Err(error);
                }

                let delay = policy.delay_for(&error, attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries(),
                    error = %error,
                    status = ?error.status().map(|s| s.as_u16()),
                    code = ?error.code(),
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );
                metrics::record_retry(error.kind());

                tokio::select! {
                    biased;
                    _ = any_cancelled(&signals) => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::test_support::*;
    use crate::resilience::NetworkErrorCode;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use std::sync::Mutex;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    /// Records the instant of every call so gaps can be asserted.
    fn timed(statuses: Vec<u16>, stamps: Arc<Mutex<Vec<Instant>>>) -> ScriptedService {
        ScriptedService::new(move |call, _| {
            stamps.lock().unwrap().push(Instant::now());
            let outcome = statuses.get(call).copied();
            Box::pin(async move {
                match outcome {
                    Some(status) => Err(http_error(status)),
                    None => Ok(ok_response()),
                }
            })
        })
    }

    fn gaps(stamps: &[Instant]) -> Vec<Duration> {
        stamps.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_makes_single_attempt() {
        let base = ScriptedService::failing_then_ok(vec![400]);
        let service = RetryLayer::new(RetryPolicy::binance()).layer(base.clone());

        let start = Instant::now();
        let err = service
            .oneshot(request("https://api.binance.com/api/v3/depth?symbol=BTCUSDT"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(base.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_server_error_exhausts_budget() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let base = timed(vec![500; 10], stamps.clone());
        let policy = RetryPolicy::binance();
        assert_eq!(policy.max_retries(), 3);
        let service = RetryLayer::new(policy).layer(base.clone());

        let err = service
            .oneshot(request("https://api.binance.com/api/v3/depth?symbol=BTCUSDT"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(base.calls(), 4);
        assert_eq!(
            gaps(&stamps.lock().unwrap()),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_capped_at_max_delay() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let base = timed(vec![502; 10], stamps.clone());
        let policy = RetryPolicy::binance().with_max_delay(Duration::from_millis(300));
        let service = RetryLayer::new(policy).layer(base.clone());

        let _ = service
            .oneshot(request("https://api.binance.com/api/v3/ping"))
            .await;

        assert_eq!(
            gaps(&stamps.lock().unwrap()),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_used() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let recorder = stamps.clone();
        let base = ScriptedService::new(move |call, _| {
            recorder.lock().unwrap().push(Instant::now());
            Box::pin(async move {
                if call == 0 {
                    let mut headers = HeaderMap::new();
                    headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
                    Err(FetchError::Http {
                        status: StatusCode::TOO_MANY_REQUESTS,
                        headers,
                    })
                } else {
                    Ok(ok_response())
                }
            })
        });
        let service = RetryLayer::new(RetryPolicy::binance()).layer(base.clone());

        service
            .oneshot(request("https://api.binance.com/api/v3/ping"))
            .await
            .unwrap();

        assert_eq!(base.calls(), 2);
        assert_eq!(gaps(&stamps.lock().unwrap()), vec![Duration::from_millis(2000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let base = ScriptedService::failing_then_ok(vec![503, 503]);
        let service = RetryLayer::new(RetryPolicy::binance()).layer(base.clone());
        let signal = CancellationToken::new();

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = service
            .oneshot(request("https://api.binance.com/api/v3/ping").with_signal(signal))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Cancelled));
        assert_eq!(base.calls(), 1);
    }

    #[test]
    fn test_binance_classification() {
        assert!(is_binance_retryable(&http_error(429)));
        assert!(is_binance_retryable(&http_error(418)));
        assert!(is_binance_retryable(&http_error(500)));
        assert!(is_binance_retryable(&http_error(503)));
        assert!(!is_binance_retryable(&http_error(400)));
        assert!(!is_binance_retryable(&http_error(404)));
        assert!(is_binance_retryable(&FetchError::Network {
            code: NetworkErrorCode::TimedOut,
            message: String::new(),
        }));
        assert!(is_binance_retryable(&FetchError::Network {
            code: NetworkErrorCode::ConnectionReset,
            message: String::new(),
        }));
        assert!(!is_binance_retryable(&FetchError::Network {
            code: NetworkErrorCode::ConnectionRefused,
            message: String::new(),
        }));
        assert!(!is_binance_retryable(&FetchError::Deadline(Duration::from_secs(5))));
        assert!(!is_binance_retryable(&FetchError::CircuitOpen));
    }

    #[test]
    fn test_rate_limit_delay_defaults_to_one_second() {
        assert_eq!(binance_retry_delay(&http_error(418), 3), Duration::from_secs(1));
        assert_eq!(binance_retry_delay(&http_error(500), 3), Duration::from_millis(800));
        let slow = binance_retry_delay_from(Duration::from_millis(500));
        assert_eq!(slow(&http_error(502), 2), Duration::from_secs(1));
    }
}
