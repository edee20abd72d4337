//! Application error types for release-gate
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Authentication-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// Caller-supplied password did not match
    #[error("Invalid password")]
    InvalidPassword,

    /// Client identity is blocked after too many failed attempts
    #[error("Too many failed attempts, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },
}

/// Durable store errors
///
/// These never reach a caller: the rate limiter logs and swallows them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend (Redis, KeyDB, ...) operation failed
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Upstream (GitHub REST API) errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    /// Request exceeded the configured timeout
    #[error("Upstream timeout")]
    Timeout,

    /// Connection-level failure
    #[error("Upstream network error: {0}")]
    Network(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {0}")]
    Status(u16),

    /// Asset id did not resolve to a redirect
    #[error("Asset not found")]
    AssetNotFound,

    /// Upstream answered with something unusable
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Network(e.to_string())
        }
    }
}

/// Application-level error type
///
/// Every variant renders as a small JSON object with an `error` field.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Upstream error
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

impl AppError {
    /// HTTP status this error is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(AuthError::InvalidPassword) => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(UpstreamError::AssetNotFound) => StatusCode::NOT_FOUND,
            AppError::Upstream(UpstreamError::Status(code)) => {
                match StatusCode::from_u16(*code) {
                    Ok(status) if status.is_client_error() || status.is_server_error() => status,
                    _ => StatusCode::BAD_GATEWAY,
                }
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON body this error is reported with
    pub fn body(&self) -> serde_json::Value {
        match self {
            AppError::Auth(AuthError::InvalidPassword) => {
                serde_json::json!({ "error": "Invalid password" })
            }
            AppError::Auth(AuthError::RateLimited { retry_after_secs }) => serde_json::json!({
                "error": "Too many failed attempts. Please try again later.",
                "retryAfter": retry_after_secs
            }),
            AppError::Upstream(UpstreamError::AssetNotFound) => {
                serde_json::json!({ "error": "Asset not found" })
            }
            AppError::Upstream(UpstreamError::Status(_)) => {
                serde_json::json!({ "error": "Failed to fetch releases" })
            }
            AppError::Upstream(_) => serde_json::json!({ "error": "Upstream unavailable" }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();

        if let AppError::Auth(AuthError::RateLimited { retry_after_secs }) = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
