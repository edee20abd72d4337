//! Authentication manager
//!
//! This module provides the gate every non-preflight request passes through:
//! rate-limit check, password comparison, then recording the outcome.

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, warn};

use crate::config::AuthConfig as FileAuthConfig;
use crate::error::AuthError;
use crate::store::KvStore;

use super::credential::verify_secret;
use super::identity::client_identity;
use super::ratelimit::{RateLimitConfig, RateLimiter};

/// Header carrying the caller's shared secret
pub const PASSWORD_HEADER: &str = "x-password";

/// Configuration for the authentication manager
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared secret callers must present
    pub password: String,

    /// Headers consulted, in order, for the client identity
    pub identity_headers: Vec<String>,

    /// Rate limit configuration
    pub rate_limit: RateLimitConfig,
}

impl AuthConfig {
    /// Build from the file configuration section
    pub fn from_config(config: &FileAuthConfig) -> Self {
        Self {
            password: config.password.clone(),
            identity_headers: config.identity_headers.clone(),
            rate_limit: RateLimitConfig::from(&config.rate_limit),
        }
    }
}

/// Authentication manager
///
/// Holds the configured secret and the rate limiter.
pub struct AuthManager {
    password: String,
    identity_headers: Vec<String>,
    rate_limiter: RateLimiter,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// `store` of `None` disables rate limiting.
    pub fn new(config: AuthConfig, store: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            password: config.password,
            identity_headers: config.identity_headers,
            rate_limiter: RateLimiter::new(config.rate_limit, store),
        }
    }

    /// Derive the rate-limiting identity for a request
    pub fn identity(&self, headers: &HeaderMap) -> String {
        client_identity(headers, &self.identity_headers)
    }

    /// Authenticate a request by its headers
    ///
    /// Returns the client identity on success.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let identity = self.identity(headers);

        let provided = headers
            .get(PASSWORD_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();

        self.authenticate_as(&identity, provided).await?;
        Ok(identity)
    }

    /// Run the gate for an already-derived identity and caller secret
    pub async fn authenticate_as(&self, identity: &str, provided: &[u8]) -> Result<(), AuthError> {
        let status = self.rate_limiter.check_blocked(identity).await;
        if status.blocked {
            let retry_after_secs = status.retry_after_secs.unwrap_or(1);
            warn!(
                identity,
                attempts = status.attempts,
                retry_after_secs,
                "Rejected request from blocked client"
            );
            return Err(AuthError::RateLimited { retry_after_secs });
        }

        if !verify_secret(provided, self.password.as_bytes()) {
            let attempts = self.rate_limiter.record_failure(identity).await;
            warn!(identity, attempts, "Invalid password");
            return Err(AuthError::InvalidPassword);
        }

        self.rate_limiter.record_success(identity).await;
        debug!(identity, "Client authenticated");
        Ok(())
    }

    /// Whether failed attempts are being rate limited
    pub fn is_rate_limiting_enabled(&self) -> bool {
        self.rate_limiter.is_enabled()
    }

    #[cfg(test)]
    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
