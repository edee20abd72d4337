//! HTTP router for release-gate
//!
//! Every request passes through the same stack: CORS (which answers
//! preflights itself), logging, then the password gate. Past the gate the
//! path selects one of three behaviors: the release listing, download URL
//! resolution, or the info document. Unmatched paths get the info document.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::any,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthManager;
use crate::error::AppError;
use crate::otel::Metrics;
use crate::upstream::ReleaseSource;

use super::middleware::{
    auth_middleware, cors_middleware, logging_middleware, tracing_middleware,
};

const RELEASES_CACHE_CONTROL: &str = "public, max-age=60";
const DOWNLOAD_CACHE_CONTROL: &str = "no-cache";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Password gate and rate limiter
    pub auth_manager: Arc<AuthManager>,

    /// Upstream release API
    pub releases: Arc<dyn ReleaseSource>,

    /// Metrics, when telemetry is configured
    pub metrics: Option<Arc<Metrics>>,
}

/// Body of a resolved download URL
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub download_url: String,
}

/// Info document served for every unmatched path
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub path: String,
    pub description: String,
}

/// Build the main application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/releases", any(releases_handler))
        .route("/download-url/:asset_id", any(download_url_handler))
        .fallback(info_handler)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn(cors_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            logging_middleware,
        ))
        .layer(middleware::from_fn(tracing_middleware))
        .with_state(state)
}

fn record_upstream(state: &AppState, operation: &'static str, start: Instant) {
    if let Some(ref metrics) = state.metrics {
        metrics.record_upstream_duration(operation, start.elapsed().as_secs_f64());
    }
}

/// List releases, passing the upstream payload through unmodified
async fn releases_handler(State(state): State<AppState>) -> Result<Response, AppError> {
    let start = Instant::now();
    let result = state.releases.list_releases().await;
    record_upstream(&state, "list_releases", start);

    let body = result?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, RELEASES_CACHE_CONTROL),
        ],
        body,
    )
        .into_response())
}

/// Resolve an asset to its short-lived download URL
async fn download_url_handler(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Result<Response, AppError> {
    // Non-numeric ids are not a recognized operation
    let Ok(asset_id) = asset_id.parse::<u64>() else {
        return Ok(info_handler().await.into_response());
    };

    let start = Instant::now();
    let result = state.releases.resolve_asset_url(asset_id).await;
    record_upstream(&state, "resolve_asset", start);

    let download_url = result?;
    Ok((
        [(header::CACHE_CONTROL, DOWNLOAD_CACHE_CONTROL)],
        Json(DownloadUrlResponse { download_url }),
    )
        .into_response())
}

async fn info_handler() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            EndpointInfo {
                path: "/releases".to_string(),
                description: "List all releases".to_string(),
            },
            EndpointInfo {
                path: "/download-url/:assetId".to_string(),
                description: "Get a short-lived download URL for an asset".to_string(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, RateLimitConfig};
    use crate::error::UpstreamError;
    use crate::store::MemoryStore;
    use crate::upstream::MockReleaseSource;
    use axum::http::Method;
    use axum_test::TestServer;
    use bytes::Bytes;

    const PASSWORD: &str = "s3cret";

    fn create_test_state(releases: MockReleaseSource) -> AppState {
        let auth_manager = AuthManager::new(
            AuthConfig {
                password: PASSWORD.to_string(),
                identity_headers: vec!["X-Real-IP".to_string()],
                rate_limit: RateLimitConfig::default(),
            },
            Some(Arc::new(MemoryStore::new())),
        );

        AppState {
            auth_manager: Arc::new(auth_manager),
            releases: Arc::new(releases),
            metrics: None,
        }
    }

    fn server_with(releases: MockReleaseSource) -> TestServer {
        TestServer::new(build_router(create_test_state(releases))).unwrap()
    }

    // Test 1: Releases are passed through with the cache header
    #[tokio::test]
    async fn test_releases_passthrough() {
        let payload = r#"[{"id":1,"tag_name":"v1.0.0"}]"#;
        let mut releases = MockReleaseSource::new();
        releases
            .expect_list_releases()
            .times(1)
            .returning(move || Ok(Bytes::from_static(payload.as_bytes())));

        let response = server_with(releases)
            .get("/releases")
            .add_header("x-password", PASSWORD)
            .await;

        response.assert_status_ok();
        response.assert_text(payload);
        assert_eq!(response.header("cache-control"), RELEASES_CACHE_CONTROL);
        assert_eq!(response.header("content-type"), "application/json");
        assert_eq!(response.header("access-control-allow-origin"), "*");
    }

    // Test 2: Download URL is wrapped in JSON
    #[tokio::test]
    async fn test_download_url() {
        let mut releases = MockReleaseSource::new();
        releases
            .expect_resolve_asset_url()
            .withf(|id| *id == 123)
            .returning(|_| Ok("https://cdn.example.com/app.zip?sig=x".to_string()));

        let response = server_with(releases)
            .get("/download-url/123")
            .add_header("x-password", PASSWORD)
            .await;

        response.assert_status_ok();
        response.assert_json(&serde_json::json!({
            "downloadUrl": "https://cdn.example.com/app.zip?sig=x"
        }));
        assert_eq!(response.header("cache-control"), DOWNLOAD_CACHE_CONTROL);
    }

    // Test 3: Missing asset maps to 404
    #[tokio::test]
    async fn test_download_url_not_found() {
        let mut releases = MockReleaseSource::new();
        releases
            .expect_resolve_asset_url()
            .returning(|_| Err(UpstreamError::AssetNotFound));

        let response = server_with(releases)
            .get("/download-url/999")
            .add_header("x-password", PASSWORD)
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&serde_json::json!({ "error": "Asset not found" }));
    }

    // Test 4: Non-numeric asset id falls through to info
    #[tokio::test]
    async fn test_download_url_non_numeric() {
        let mut releases = MockReleaseSource::new();
        releases.expect_resolve_asset_url().never();

        let response = server_with(releases)
            .get("/download-url/latest")
            .add_header("x-password", PASSWORD)
            .await;

        response.assert_status_ok();
        let body: InfoResponse = response.json();
        assert_eq!(body.endpoints.len(), 2);
    }

    // Test 5: Unknown paths return the info document
    #[tokio::test]
    async fn test_info_fallback() {
        let server = server_with(MockReleaseSource::new());

        for path in ["/", "/whatever/else"] {
            let response = server.get(path).add_header("x-password", PASSWORD).await;
            response.assert_status_ok();
            let body: InfoResponse = response.json();
            assert_eq!(body.name, "release-gate");
            assert_eq!(body.endpoints[0].path, "/releases");
        }
    }

    // Test 6: Every route is gated, including the fallback
    #[tokio::test]
    async fn test_routes_require_password() {
        let mut releases = MockReleaseSource::new();
        releases.expect_list_releases().never();
        releases.expect_resolve_asset_url().never();
        let server = server_with(releases);

        for path in ["/releases", "/download-url/1", "/"] {
            let response = server.get(path).add_header("x-password", "wrong").await;
            response.assert_status(StatusCode::UNAUTHORIZED);
            assert_eq!(response.header("access-control-allow-origin"), "*");
        }
    }

    // Test 7: Upstream failure status is surfaced on the listing
    #[tokio::test]
    async fn test_releases_upstream_status() {
        let mut releases = MockReleaseSource::new();
        releases
            .expect_list_releases()
            .returning(|| Err(UpstreamError::Status(403)));

        let response = server_with(releases)
            .get("/releases")
            .add_header("x-password", PASSWORD)
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        response.assert_json(&serde_json::json!({ "error": "Failed to fetch releases" }));
    }

    // Test 8: Upstream timeout maps to 502
    #[tokio::test]
    async fn test_releases_upstream_timeout() {
        let mut releases = MockReleaseSource::new();
        releases
            .expect_list_releases()
            .returning(|| Err(UpstreamError::Timeout));

        let response = server_with(releases)
            .get("/releases")
            .add_header("x-password", PASSWORD)
            .await;

        response.assert_status(StatusCode::BAD_GATEWAY);
    }

    // Test 9: Preflight never reaches the gate or upstream
    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let mut releases = MockReleaseSource::new();
        releases.expect_list_releases().never();
        let server = server_with(releases);

        let response = server.method(Method::OPTIONS, "/releases").await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert!(response.as_bytes().is_empty());
    }
}
