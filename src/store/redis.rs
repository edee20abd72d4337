//! Redis-based key-value store
//!
//! Backed by a `fred` connection pool so records are shared by every proxy
//! instance pointed at the same Redis / KeyDB server. Expiry is delegated to
//! the server with `SET ... EX`.

use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Pool;
use fred::interfaces::{ClientLike, KeysInterface};
use fred::types::config::{Config as FredConfig, ReconnectPolicy};
use fred::types::{Builder, Expiration};
use tracing::{info, trace};

use crate::error::StoreError;

use super::KvStore;

const POOL_SIZE: usize = 2;

/// Redis / KeyDB store
pub struct RedisStore {
    pool: Pool,
    prefix: String,
}

impl RedisStore {
    /// Connect to the server at `url` and verify it answers PING
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let config = FredConfig::from_url(url).map_err(backend)?;

        let mut builder = Builder::from_config(config);
        builder.set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2));

        let pool = builder.build_pool(POOL_SIZE).map_err(backend)?;
        pool.init().await.map_err(backend)?;

        let _: String = pool.ping(None).await.map_err(backend)?;

        info!(pool_size = POOL_SIZE, prefix, "Redis store connected");

        Ok(Self {
            pool,
            prefix: prefix.to_string(),
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

fn backend(e: fred::error::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// `EX` takes whole seconds; never round a non-zero TTL down to 0
fn ttl_secs(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = self.pool.get(self.make_key(key)).await.map_err(backend)?;
        trace!(key, hit = value.is_some(), "redis GET");
        Ok(value)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let secs = ttl_secs(ttl);
        let _: () = self
            .pool
            .set(
                self.make_key(key),
                value,
                Some(Expiration::EX(secs)),
                None,
                false,
            )
            .await
            .map_err(backend)?;
        trace!(key, ttl_secs = secs, "redis SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _: i64 = self.pool.del(self.make_key(key)).await.map_err(backend)?;
        trace!(key, "redis DEL");
        Ok(())
    }
}
