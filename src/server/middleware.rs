//! HTTP middleware for release-gate
//!
//! This module provides middleware layers for:
//! - CORS headers and preflight short-circuiting
//! - The password gate (rate-limit check, then credential comparison)
//! - Request/response logging
//! - OpenTelemetry tracing

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

use crate::error::{AppError, AuthError};

use super::router::AppState;

/// CORS allowed origin
pub const ALLOW_ORIGIN: &str = "*";

/// CORS allowed methods
pub const ALLOW_METHODS: &str = "GET, OPTIONS";

/// CORS allowed request headers
pub const ALLOW_HEADERS: &str = "Content-Type, X-Password";

/// Identity of the authenticated caller, added to request extensions
#[derive(Clone, Debug)]
pub struct ClientIdentity(pub String);

fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// CORS middleware function
///
/// Answers `OPTIONS` on any path with an empty 204 without running the rest of
/// the stack, and stamps the CORS headers on every other response.
pub async fn cors_middleware(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    apply_cors_headers(&mut response);
    response
}

/// Authentication middleware function
///
/// This middleware:
/// 1. Derives the client identity from the configured headers
/// 2. Rejects blocked identities with 429
/// 3. Compares `X-Password` against the shared secret, 401 on mismatch
/// 4. Adds the client identity to the request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match state.auth_manager.authenticate(request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(ClientIdentity(identity));
            Ok(next.run(request).await)
        }
        Err(err) => {
            if let Some(ref metrics) = state.metrics {
                match err {
                    AuthError::InvalidPassword => metrics.record_auth_failure(),
                    AuthError::RateLimited { .. } => metrics.record_rate_limited(),
                }
            }
            Err(err.into())
        }
    }
}

/// Metrics label for a request path
pub fn route_label(method: &Method, path: &str) -> &'static str {
    if method == Method::OPTIONS {
        "preflight"
    } else if path == "/releases" {
        "releases"
    } else if path.starts_with("/download-url/") {
        "download_url"
    } else {
        "info"
    }
}

/// Logging middleware function
///
/// Logs method, path, status and response time, and counts the request in
/// the metrics when they are configured.
pub async fn logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    if let Some(ref metrics) = state.metrics {
        metrics.record_request(route_label(&method, &path), status.as_u16());
    }

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}

/// Tracing middleware function
///
/// Creates OpenTelemetry spans for requests.
/// Uses the Instrument trait to properly span the entire request lifecycle,
/// including async operations.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Path only: query strings never reach the span
    let span = tracing::info_span!(
        "http_request",
        http.method = %method,
        http.route = %path,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
