//! HTTP mapping of gateway errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gasrelay::error::{RateLimitError, RelayError};

/// Errors returned by the relay and drip endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A gateway rejected the request.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The JSON body could not be decoded.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// The request task did not complete.
    #[error("Request aborted: {0}")]
    Aborted(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Relay(err) => match err {
                RelayError::Validation(_)
                | RelayError::RateLimit(RateLimitError::AlreadyFunded { .. }) => {
                    StatusCode::BAD_REQUEST
                }
                RelayError::RateLimit(RateLimitError::AlreadyServed { .. }) => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                RelayError::ResourceExhaustion(_) => StatusCode::SERVICE_UNAVAILABLE,
                RelayError::Configuration(_) | RelayError::Chain(_) | RelayError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Relay(RelayError::Configuration(e)) => {
                tracing::error!(error = %e, "Relayer misconfigured");
                serde_json::json!({ "error": "Server misconfigured: relayer is not available" })
            }
            Self::Relay(RelayError::Store(e)) => {
                tracing::error!(error = %e, "Rate limit store failed");
                serde_json::json!({ "error": "Internal error, try again later" })
            }
            Self::Relay(RelayError::RateLimit(RateLimitError::AlreadyFunded { balance, .. })) => {
                serde_json::json!({ "error": self.to_string(), "balance": balance })
            }
            Self::Relay(RelayError::Chain(e)) => {
                tracing::error!(error = ?e, "Chain request failed");
                serde_json::json!({ "error": e.to_string() })
            }
            Self::Aborted(reason) => {
                tracing::error!(%reason, "Request task aborted");
                serde_json::json!({ "error": "Internal error, try again later" })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}
