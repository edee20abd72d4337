//! GitHub REST API client
//!
//! Issues authenticated requests for the configured repository. Redirects are
//! never followed: the asset endpoint's `Location` header is the value the
//! proxy hands back to callers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LOCATION};
use reqwest::{redirect, Client, StatusCode};
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

use super::ReleaseSource;

const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_BINARY: &str = "application/octet-stream";

/// GitHub releases client for a single repository
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    repo: String,
}

impl GitHubClient {
    /// Build a client from the upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| UpstreamError::InvalidResponse("token is not a valid header".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
        })
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.api_url, self.repo)
    }

    fn asset_url(&self, asset_id: u64) -> String {
        format!(
            "{}/repos/{}/releases/assets/{}",
            self.api_url, self.repo, asset_id
        )
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn list_releases(&self) -> Result<Bytes, UpstreamError> {
        let url = self.releases_url();
        debug!(url = %url, "Fetching releases");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, ACCEPT_JSON)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(repo = %self.repo, status = status.as_u16(), "Release listing failed");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(repo = %self.repo, body_size = body.len(), "Received releases");
        Ok(body)
    }

    async fn resolve_asset_url(&self, asset_id: u64) -> Result<String, UpstreamError> {
        let response = self
            .client
            .get(self.asset_url(asset_id))
            .header(ACCEPT, ACCEPT_BINARY)
            .send()
            .await?;

        if response.status() != StatusCode::FOUND {
            debug!(asset_id, status = response.status().as_u16(), "Asset did not redirect");
            return Err(UpstreamError::AssetNotFound);
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                warn!(asset_id, "Asset redirect without Location header");
                UpstreamError::AssetNotFound
            })
    }
}
