use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

use super::CacheError;
use crate::config::MAX_CACHE_TTL_SECS;

/// How often a write also drops every expired entry.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// TTL-keyed backing store for the cache manager.
///
/// Implementations must tolerate concurrent get/set without external locking.
/// Last-write-wins is acceptable when two callers race on the same miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

/// Shared store backed by Redis `SET EX`. The multiplexed connection is
/// opened on first use and reused afterwards; a failed connect is retried on
/// the next call.
pub struct RedisCacheStore {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisCacheStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // Redis rejects EX 0
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process
// ────────────────────────────────────────────────────────────────────────────

/// Process-local store. An expired entry is dropped when it is read, and a
/// write sweeps all expired entries at most once per [`SWEEP_INTERVAL`], so
/// keys that are never read again do not pile up.
pub struct MemoryCacheStore {
    entries: DashMap<String, (String, Instant)>,
    next_sweep: Mutex<Instant>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_sweep: Mutex::new(Instant::now() + SWEEP_INTERVAL),
        }
    }

    fn sweep_if_due(&self, now: Instant) {
        // A concurrent writer is already sweeping.
        let Ok(mut next) = self.next_sweep.try_lock() else {
            return;
        };
        if now < *next {
            return;
        }
        *next = now + SWEEP_INTERVAL;
        drop(next);

        let before = self.entries.len();
        self.entries.retain(|_, (_, expires)| *expires > now);
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            debug!("Cache sweep dropped {dropped} expired entries");
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if hit {
            self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let ttl = ttl.min(Duration::from_secs(MAX_CACHE_TTL_SECS));
        self.sweep_if_due(now);
        self.entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
