//! Rate limiter for authentication failures
//!
//! This module provides per-identity rate limiting for failed password
//! attempts. Records live in an external [`KvStore`] so the proxy itself keeps
//! no mutable state between requests.
//!
//! Policy: every failure refreshes the record's `resetAt` to
//! `now + block_duration`; an identity is blocked while it has at least
//! `max_failed_attempts` recorded failures and `now < resetAt`. A success
//! deletes the record.
//!
//! Store errors never block a request: they are logged and the limiter
//! behaves as if the store were empty.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AuthRateLimitConfig;
use crate::store::KvStore;

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Number of failed attempts after which an identity is blocked
    pub max_failed_attempts: u32,

    /// Block window, measured from the most recent failure
    pub block_duration: Duration,

    /// Store-side expiry applied to every written record
    pub record_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            block_duration: Duration::from_secs(15 * 60),
            record_ttl: Duration::from_secs(900),
        }
    }
}

impl From<&AuthRateLimitConfig> for RateLimitConfig {
    fn from(config: &AuthRateLimitConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            block_duration: Duration::from_secs(config.block_duration_secs),
            record_ttl: Duration::from_secs(config.record_ttl_secs),
        }
    }
}

/// Failed-attempt record persisted per client identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    /// Consecutive failures inside the current window
    pub attempts: u32,

    /// Unix timestamp (milliseconds) at which the window closes
    pub reset_at: i64,
}

impl RateLimitRecord {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.reset_at
    }
}

/// Outcome of [`RateLimiter::check_blocked`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockStatus {
    /// Whether the identity must be rejected
    pub blocked: bool,

    /// Seconds until the block lifts, present only when blocked
    pub retry_after_secs: Option<u64>,

    /// Failures counted in the live window
    pub attempts: u32,
}

impl BlockStatus {
    fn open(attempts: u32) -> Self {
        Self {
            blocked: false,
            retry_after_secs: None,
            attempts,
        }
    }
}

/// Rate limiter for authentication failures
///
/// With no store configured every operation is a no-op and nothing is ever
/// blocked.
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Option<Arc<dyn KvStore>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration and store
    pub fn new(config: RateLimitConfig, store: Option<Arc<dyn KvStore>>) -> Self {
        Self { config, store }
    }

    #[cfg(test)]
    fn disabled() -> Self {
        Self::new(RateLimitConfig::default(), None)
    }

    /// Whether a store is configured
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Check whether `identity` is currently blocked
    pub async fn check_blocked(&self, identity: &str) -> BlockStatus {
        self.check_blocked_at(identity, Utc::now()).await
    }

    /// Record a failed authentication attempt for `identity`
    ///
    /// Returns the new attempt count (0 when rate limiting is disabled).
    pub async fn record_failure(&self, identity: &str) -> u32 {
        self.record_failure_at(identity, Utc::now()).await
    }

    /// Forget all failures for `identity` (after a successful authentication)
    pub async fn record_success(&self, identity: &str) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = store.delete(identity).await {
            warn!(error = %e, identity, "Failed to clear rate limit record");
        }
    }

    #[cfg(test)]
    pub(crate) async fn failure_count(&self, identity: &str) -> u32 {
        let now = Utc::now();
        self.load(identity)
            .await
            .filter(|r| !r.is_stale(now))
            .map_or(0, |r| r.attempts)
    }

    async fn check_blocked_at(&self, identity: &str, now: DateTime<Utc>) -> BlockStatus {
        let Some(record) = self.load(identity).await else {
            return BlockStatus::default();
        };

        if record.is_stale(now) {
            return BlockStatus::open(0);
        }

        if record.attempts < self.config.max_failed_attempts {
            return BlockStatus::open(record.attempts);
        }

        let remaining_ms = record.reset_at - now.timestamp_millis();
        let retry_after_secs = (remaining_ms as u64).div_ceil(1000);

        BlockStatus {
            blocked: true,
            retry_after_secs: Some(retry_after_secs),
            attempts: record.attempts,
        }
    }

    async fn record_failure_at(&self, identity: &str, now: DateTime<Utc>) -> u32 {
        let Some(store) = &self.store else {
            return 0;
        };

        let attempts = self
            .load(identity)
            .await
            .filter(|r| !r.is_stale(now))
            .map_or(0, |r| r.attempts);

        let block_ms = i64::try_from(self.config.block_duration.as_millis()).unwrap_or(i64::MAX);
        let record = RateLimitRecord {
            attempts: attempts.saturating_add(1),
            reset_at: now.timestamp_millis().saturating_add(block_ms),
        };

        let value = match serde_json::to_string(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, identity, "Failed to encode rate limit record");
                return record.attempts;
            }
        };

        if let Err(e) = store.put(identity, value, self.config.record_ttl).await {
            warn!(error = %e, identity, "Failed to store rate limit record");
            return record.attempts;
        }

        if record.attempts == self.config.max_failed_attempts {
            info!(
                identity,
                attempts = record.attempts,
                block_secs = self.config.block_duration.as_secs(),
                "Client identity blocked after repeated authentication failures"
            );
        } else {
            debug!(identity, attempts = record.attempts, "Authentication failure recorded");
        }

        record.attempts
    }

    async fn load(&self, identity: &str) -> Option<RateLimitRecord> {
        let store = self.store.as_ref()?;

        let raw = match store.get(identity).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, identity, "Failed to read rate limit record");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, identity, "Discarding malformed rate limit record");
                None
            }
        }
    }
}
