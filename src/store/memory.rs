//! In-memory key-value store
//!
//! Entries carry their own expiry and are invisible once expired. A sweeper
//! task started with [`MemoryStore::spawn_sweeper`] removes them for good, so
//! keys that are never read again do not accumulate. Suitable for a single
//! proxy instance; records are lost on restart.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::StoreError;

use super::KvStore;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Process-local store with per-key expiry
#[derive(Clone, Default)]
pub struct MemoryStore {
    prefix: String,
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Creates an empty store with no key prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that prefixes every key
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            entries: Arc::default(),
        }
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the store holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Deletes all expired entries and returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        purge(&self.entries).await
    }

    /// Purge expired entries every `every` until the store is dropped
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let entries: Weak<RwLock<HashMap<String, Entry>>> = Arc::downgrade(&self.entries);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let purged = purge(&entries).await;
                if purged > 0 {
                    debug!(purged, "Purged expired memory store entries");
                }
            }
        })
    }

    #[cfg(test)]
    async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

async fn purge(entries: &RwLock<HashMap<String, Entry>>) -> usize {
    let now = Utc::now();
    let mut entries = entries.write().await;
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    before - entries.len()
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = self.make_key(key);
        let now = Utc::now();

        let expired = match self.entries.read().await.get(&key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            let mut entries = self.entries.write().await;
            if entries.get(&key).is_some_and(|e| e.is_expired(now)) {
                entries.remove(&key);
            }
        }

        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Backend(format!("invalid ttl: {}", e)))?;
        let entry = Entry {
            value,
            expires_at: Utc::now() + ttl,
        };
        self.entries.write().await.insert(self.make_key(key), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(&self.make_key(key));
        Ok(())
    }
}
