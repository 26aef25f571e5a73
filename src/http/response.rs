//! Error responses.
//!
//! # Responsibilities
//! - Map route and exchange failures to HTTP status codes
//! - Keep error bodies stable JSON objects
//!
//! # Design Decisions
//! - An open circuit is 503; every other upstream failure is 502
//! - Validation failures list every rejected field

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::quoting::{FieldError, RouteError};
use crate::resilience::FetchError;

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    Route(RouteError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Route(RouteError::InvalidOrder(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Route(RouteError::InsufficientLiquidity) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Route(RouteError::Exchange { source, .. }) => {
                match source.fetch_error() {
                    Some(FetchError::CircuitOpen) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_GATEWAY,
                }
            }
        }
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        Self::Route(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation(details) => json!({
                "error": "Invalid request data",
                "details": details,
            }),
            Self::Route(RouteError::InvalidOrder(message)) => json!({
                "error": "Invalid request data",
                "details": [{ "field": "volume", "message": message }],
            }),
            Self::Route(RouteError::InsufficientLiquidity) => json!({
                "error": "Insufficient liquidity to fulfill order",
            }),
            Self::Route(err @ RouteError::Exchange { .. }) => {
                tracing::error!(error = %err, "Upstream exchange failure");
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    json!({ "error": "Exchange temporarily unavailable" })
                } else {
                    json!({ "error": "Upstream exchange request failed" })
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
