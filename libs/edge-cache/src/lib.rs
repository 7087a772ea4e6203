//! Shared TTL-bucketed cache for signed URLs and rewritten manifests
//!
//! Values are plain strings written once per cache miss and expired
//! solely by the backing store; there is no explicit invalidation path.
//! Concurrent writers to one key race harmlessly: every writer computes
//! the same deterministic value for (storage key, time window), so
//! last-write-wins is safe and no read-modify-write ever occurs.

mod error;
pub mod keys;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, DEFAULT_WINDOW_SECS};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Core cache operations: TTL put/get, batched for list resolution.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Batched lookup; result is positional with `keys`.
    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>>;

    /// Batched write, one shared TTL.
    async fn put_many(&self, entries: &[(String, String)], ttl_secs: u64) -> CacheResult<()>;
}

/// Redis-backed cache over a shared connection manager.
#[derive(Clone)]
pub struct RedisCache {
    conn: Arc<Mutex<ConnectionManager>>,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::with_manager(Arc::new(Mutex::new(manager))))
    }

    pub fn with_manager(manager: Arc<Mutex<ConnectionManager>>) -> Self {
        Self { conn: manager }
    }

    /// Add jitter to TTL to prevent thundering herd on window rollover.
    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn.get(key).await?;
        match &value {
            Some(_) => debug!(key = %key, "Cache hit"),
            None => debug!(key = %key, "Cache miss"),
        }
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let ttl = Self::add_jitter(ttl_secs);
        let mut conn = self.conn.lock().await;
        conn.set_ex::<_, _, ()>(key, value, ttl).await?;
        debug!(key = %key, ttl, "Cache set");
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(key);
        }

        let mut conn = self.conn.lock().await;
        let values: Vec<Option<String>> = pipe.query_async(&mut *conn).await?;
        debug!(
            requested = keys.len(),
            hits = values.iter().filter(|v| v.is_some()).count(),
            "Cache pipeline get"
        );
        Ok(values)
    }

    async fn put_many(&self, entries: &[(String, String)], ttl_secs: u64) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(key, value, Self::add_jitter(ttl_secs));
        }

        let mut conn = self.conn.lock().await;
        pipe.query_async::<_, ()>(&mut *conn).await?;
        debug!(count = entries.len(), "Cache pipeline set");
        Ok(())
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process cache with per-entry expiry.
///
/// Used in tests and cache-less deployments. Reads skip expired
/// entries; writers sweep them out under the write lock, so the map
/// holds only the live set even as windowed keys roll over.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|entry| now < entry.expires_at)
                    .map(|entry| entry.value.clone())
            })
            .collect())
    }

    async fn put_many(&self, items: &[(String, String)], ttl_secs: u64) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| now < entry.expires_at);
        let expires_at = now + Duration::from_secs(ttl_secs);
        for (key, value) in items {
            entries.insert(
                key.clone(),
                MemoryEntry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }
}
