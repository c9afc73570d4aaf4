//! API errors mapped to HTTP status codes.
//!
//! Every variant renders the same envelope: `{"error": "message"}`.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error responses produced by the HTTP layer.
///
/// - `RateLimitExceeded` → 429
/// - `ServerError` → 500
/// - `NotFound` → 404
/// - `MethodNotAllowed` → 405
/// - `RequestTimeout` → 408
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The client has no tokens left.
    RateLimitExceeded,
    /// Something went wrong on our side; details are logged, not returned.
    ServerError,
    /// No route matches the request path.
    NotFound,
    /// The route exists but not for this method.
    MethodNotAllowed(Method),
    /// The request outlived the server's request timeout.
    RequestTimeout,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// Client-facing message.
    pub fn message(&self) -> String {
        match self {
            ApiError::RateLimitExceeded => "rate limit exceeded".to_string(),
            ApiError::ServerError => {
                "the server encountered a problem and could not process your request".to_string()
            }
            ApiError::NotFound => "the requested resource could not be found".to_string(),
            ApiError::MethodNotAllowed(method) => {
                format!("the {} method is not supported for this resource", method)
            }
            ApiError::RequestTimeout => {
                "the server took too long to process your request".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}
