//! Gateway error type
//!
//! Every variant renders as `{"error": "<message>"}` with a fixed status code.
//! The message is the variant's `Display` text and never carries internal
//! detail; causes are logged where the error is raised.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("authorization header required")]
    MissingAuthHeader,

    #[error("invalid authorization header format")]
    MalformedAuthHeader,

    #[error("invalid token")]
    InvalidToken,

    #[error("service not found")]
    NoRoute,

    #[error("not found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("failed to process rate limit")]
    RateLimitUnavailable,

    #[error("invalid target URL")]
    InvalidTarget,

    #[error("failed to forward request")]
    Upstream,
}

/// JSON error body shared by every rejecting stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingAuthHeader
            | GatewayError::MalformedAuthHeader
            | GatewayError::InvalidToken => StatusCode::UNAUTHORIZED,
            GatewayError::NoRoute | GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RateLimitUnavailable | GatewayError::InvalidTarget => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Upstream => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}
