//! The network call at the bottom of every pipeline.

use std::task::{Context, Poll};
use std::time::Duration;

use reqwest::Client;
use tower::Service;

use crate::resilience::cancel::any_cancelled;
use crate::resilience::{ExchangeRequest, ExchangeResponse, FetchError, ResponseFuture};

/// Base request function backed by a shared `reqwest::Client`.
///
/// Non-2xx responses become [`FetchError::Http`] with the response headers,
/// so retry and rate-limit stages can inspect them.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Transport with connection pooling and a connect timeout.
    pub fn with_defaults() -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self::new(client))
    }
}

impl Service<ExchangeRequest> for ReqwestTransport {
    type Response = ExchangeResponse;
    type Error = FetchError;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ExchangeRequest) -> Self::Future {
        let client = self.client.clone();

        Box::pin(async move {
            let signals = request.signals();
            let options = request.options();

            let builder = match &options.body {
                Some(body) => client.post(request.target().clone()).body(body.clone()),
                None => client.get(request.target().clone()),
            };
            let builder = builder.headers(options.headers.clone());

            let exchange = async {
                let response = builder.send().await?;
                let status = response.status();
                let headers = response.headers().clone();

                if !status.is_success() {
                    return Err(FetchError::Http { status, headers });
                }

                let body = response.bytes().await?;
                Ok(ExchangeResponse::new(status, headers, body))
            };

            tokio::select! {
                biased;
                _ = any_cancelled(&signals) => Err(FetchError::Cancelled),
                result = exchange => result,
            }
        })
    }
}
