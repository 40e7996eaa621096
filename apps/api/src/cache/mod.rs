//! Content-addressed memoization for AI calls.
//!
//! Keys are `{domain}:{task}:{sha256(canonical_json(payload))}`. The backing
//! store is best-effort: any store failure is logged and treated as a miss,
//! never surfaced to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CacheSettings, MAX_CACHE_TTL_SECS};
use crate::models::governance::AiDomain;

pub mod store;

pub use store::{CacheStore, MemoryCacheStore, RedisCacheStore};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    settings: CacheSettings,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self { store, settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Deterministic key for `(domain, task, payload)`. Structurally equal
    /// payloads produce the same key regardless of map insertion order.
    pub fn generate_key<P: Serialize + ?Sized>(
        domain: AiDomain,
        task: &str,
        payload: &P,
    ) -> Result<String, CacheError> {
        let value = serde_json::to_value(payload)?;
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical)?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(format!("{}:{}:{}", domain, task, hex::encode(digest)))
    }

    /// Returns the cached value, or `None` on miss, expiry, disabled caching,
    /// store failure or an undecodable entry.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.settings.enabled {
            return None;
        }
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache read failed for {key}: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {key}: {e}");
                None
            }
        }
    }

    /// Stores `value` under `key`. `ttl` defaults to the configured TTL.
    /// No-op when caching is disabled.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if !self.settings.enabled {
            return;
        }
        let ttl = ttl
            .unwrap_or_else(|| Duration::from_secs(self.settings.default_ttl_secs))
            .min(Duration::from_secs(MAX_CACHE_TTL_SECS));
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping cache write for {key}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(key, raw, ttl).await {
            warn!("Cache write failed for {key}: {e}");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!("Cache invalidation failed for {key}: {e}");
        }
    }

    /// Get-or-compute wrapper for AI-backed service methods.
    ///
    /// `args` are the method's call arguments without the receiver. Only `Ok`
    /// results are stored, so a failed model call is retried on the next
    /// request rather than pinned for the TTL.
    pub async fn memoize<A, T, E, F, Fut>(
        &self,
        domain: AiDomain,
        task: &str,
        args: &A,
        compute: F,
    ) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.settings.enabled {
            return compute().await;
        }

        let key = match Self::generate_key(domain, task, args) {
            Ok(key) => key,
            Err(e) => {
                warn!("Cannot derive cache key for {domain}:{task}: {e}");
                return compute().await;
            }
        };

        if let Some(hit) = self.get::<T>(&key).await {
            debug!("Cache HIT for {domain}:{task}");
            return Ok(hit);
        }

        debug!("Cache MISS for {domain}:{task}");
        let result = compute().await?;
        self.set(&key, &result, None).await;
        Ok(result)
    }
}

/// Serializes `value` as compact JSON with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}
