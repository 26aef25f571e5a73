//! Failure taxonomy shared by every pipeline stage.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;

/// Transport-level failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorCode {
    /// The connection or read timed out (`ETIMEDOUT`).
    TimedOut,
    /// The peer reset the connection (`ECONNRESET`).
    ConnectionReset,
    /// The connection could not be established (`ECONNREFUSED`).
    ConnectionRefused,
    /// Anything else the transport reported.
    Other,
}

impl NetworkErrorCode {
    /// Timeouts and resets are the only transport failures worth retrying.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::TimedOut | Self::ConnectionReset)
    }
}

impl fmt::Display for NetworkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::TimedOut => "ETIMEDOUT",
            Self::ConnectionReset => "ECONNRESET",
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::Other => "EOTHER",
        };
        f.write_str(code)
    }
}

/// Errors surfaced by the request pipeline.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The timeout guard fired before the call settled.
    #[error("request exceeded deadline of {0:?}")]
    Deadline(Duration),

    /// The caller cancelled the call.
    #[error("request cancelled")]
    Cancelled,

    /// The circuit breaker is open and shed the call.
    #[error("circuit breaker open: service temporarily unavailable")]
    CircuitOpen,

    /// The exchange answered with a non-2xx status.
    #[error("HTTP {status}")]
    Http { status: StatusCode, headers: HeaderMap },

    /// The transport failed before a response arrived.
    #[error("network error ({code}): {message}")]
    Network {
        code: NetworkErrorCode,
        message: String,
    },
}

impl FetchError {
    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network classification, when the failure came from the transport.
    pub fn code(&self) -> Option<NetworkErrorCode> {
        match self {
            Self::Network { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Response headers carried by an HTTP failure.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Http { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// Server-provided `Retry-After` hint in whole seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers()?
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deadline(_) => "deadline",
            Self::Cancelled => "cancelled",
            Self::CircuitOpen => "circuit_open",
            Self::Http { .. } => "http",
            Self::Network { .. } => "network",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            NetworkErrorCode::TimedOut
        } else {
            match io_error_kind(&err) {
                Some(io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe) => {
                    NetworkErrorCode::ConnectionReset
                }
                Some(io::ErrorKind::TimedOut) => NetworkErrorCode::TimedOut,
                Some(io::ErrorKind::ConnectionRefused) => NetworkErrorCode::ConnectionRefused,
                _ if err.is_connect() => NetworkErrorCode::ConnectionRefused,
                _ => NetworkErrorCode::Other,
            }
        };

        FetchError::Network {
            code,
            message: err.to_string(),
        }
    }
}

/// Walk the source chain looking for the underlying I/O error.
fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = current.source();
    }
    None
}
