//! Upstream release API for release-gate
//!
//! The proxy needs exactly two read-only upstream operations, expressed by the
//! [`ReleaseSource`] trait. [`GitHubClient`] implements them against the
//! GitHub REST API using a server-held token.

pub mod github;

pub use github::GitHubClient;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::UpstreamError;

/// Read-only access to a repository's releases
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the release list as the raw upstream JSON payload
    async fn list_releases(&self) -> Result<Bytes, UpstreamError>;

    /// Resolve an asset id to its short-lived download URL
    ///
    /// Returns [`UpstreamError::AssetNotFound`] unless upstream redirects.
    async fn resolve_asset_url(&self, asset_id: u64) -> Result<String, UpstreamError>;
}
