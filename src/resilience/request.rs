//! Request and response values flowing through the pipeline.

use axum::body::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Per-call options, opaque to every stage except cancellation handling.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra request headers.
    pub headers: HeaderMap,
    /// Optional request body. A body turns the call into a POST.
    pub body: Option<Bytes>,
    /// Caller cancellation signal.
    pub signal: Option<CancellationToken>,
}

/// A single call against the exchange: target URL plus options.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    target: Url,
    signal: Option<CancellationToken>,
    options: RequestOptions,
}

impl ExchangeRequest {
    /// Create a request for `target` with default options.
    pub fn new(target: Url) -> Self {
        Self {
            target,
            signal: None,
            options: RequestOptions::default(),
        }
    }

    /// Parse `target` and create a request for it.
    pub fn parse(target: &str) -> Result<Self, url::ParseError> {
        Url::parse(target).map(Self::new)
    }

    /// Embed a cancellation signal in the descriptor itself.
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Replace the call options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn signal(&self) -> Option<&CancellationToken> {
        self.signal.as_ref()
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    /// Every cancellation source attached to this call, descriptor first.
    pub fn signals(&self) -> Vec<CancellationToken> {
        self.signal
            .iter()
            .chain(self.options.signal.iter())
            .cloned()
            .collect()
    }

    /// First value of query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.target
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// A settled exchange response.
#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ExchangeResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// True for 2xx statuses.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
