//! Recommendation list caching.
//!
//! Keys follow `{recommendation-type}:{user_id}:{filter_hash}`. The
//! backing store is pluggable: Redis in production, in-memory for tests
//! and single-node deployments. Store failures degrade to
//! compute-without-cache and are never fatal.

use crate::error::Result;
use crate::models::{RecommendationType, ScoredItem};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// TTL-keyed key-value store boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;
    /// Delete all keys starting with `prefix`; returns deleted count.
    async fn delete_matching(&self, prefix: &str) -> Result<u64>;
}

/// Redis-backed store using the shared connection manager.
pub struct RedisCacheStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete_matching(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut deleted = 0u64;
        let mut cursor = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                deleted += conn.del::<_, u64>(keys).await?;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }
}

/// In-memory TTL store.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // The read guard must be dropped before `remove` takes the same
        // shard's write lock.
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let expiry = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries.insert(key.to_string(), (value, expiry));
        Ok(())
    }

    async fn delete_matching(&self, prefix: &str) -> Result<u64> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        let deleted = keys.len() as u64;
        for key in keys {
            self.entries.remove(&key);
        }
        Ok(deleted)
    }
}

/// Stable (cross-process) hash for the filter set, FNV-1a.
fn filter_hash(filters: &BTreeMap<String, String>) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for (key, value) in filters {
        for byte in key.bytes().chain([b'=']).chain(value.bytes()).chain([b';']) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

/// TTL cache of computed recommendation lists.
pub struct RecommendationCache {
    store: Arc<dyn CacheStore>,
    ttl_secs: u64,
}

impl RecommendationCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    pub fn key(
        recommendation_type: RecommendationType,
        user_id: &str,
        filters: &BTreeMap<String, String>,
    ) -> String {
        format!(
            "{}:{}:{:016x}",
            recommendation_type.as_str(),
            user_id,
            filter_hash(filters)
        )
    }

    /// Cached list, or `None` on miss *or* store failure.
    pub async fn get(&self, key: &str) -> Option<Vec<ScoredItem>> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(items) => {
                    debug!(key, "cache hit");
                    Some(items)
                }
                Err(e) => {
                    warn!(key, error = %e, "cache payload corrupt, ignoring");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache unavailable, computing uncached");
                None
            }
        }
    }

    /// Best-effort write; failures are logged and swallowed.
    pub async fn set(&self, key: &str, items: &[ScoredItem]) {
        let Ok(bytes) = serde_json::to_vec(items) else {
            return;
        };
        if let Err(e) = self.store.set(key, bytes, self.ttl_secs).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    /// Drop every cached list for a user, across recommendation types.
    pub async fn invalidate_user(&self, user_id: &str) {
        for ty in RecommendationType::ALL {
            let prefix = format!("{}:{}:", ty.as_str(), user_id);
            match self.store.delete_matching(&prefix).await {
                Ok(deleted) if deleted > 0 => {
                    debug!(user_id, prefix, deleted, "cache invalidated");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "cache invalidation failed");
                }
            }
        }
    }
}
