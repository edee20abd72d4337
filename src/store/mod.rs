//! Durable key-value stores for release-gate
//!
//! The rate limiter persists its records through the [`KvStore`] trait so that
//! no process-wide mutable state is needed. Two backends are provided:
//! - [`MemoryStore`]: process-local, for single-instance deployments and tests
//! - [`RedisStore`]: Redis / KeyDB, shared across instances

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;

/// Trait for key-value stores with per-key expiry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the name of this store backend
    fn name(&self) -> &str;

    /// Retrieves a value by key
    ///
    /// Returns `Ok(None)` if the key is absent or has expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores a value that expires after `ttl`
    ///
    /// If the key exists, it will be overwritten and its expiry reset.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Deletes a value by key
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Build the store described by `config`
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            let store = MemoryStore::with_prefix(&config.prefix);
            store.spawn_sweeper(Duration::from_secs(config.sweep_interval_secs.max(1)));
            Ok(Arc::new(store))
        }
        StoreBackend::Redis => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::Backend("store.url is required for redis".into()))?;
            let store = RedisStore::connect(url, &config.prefix).await?;
            Ok(Arc::new(store))
        }
    }
}
