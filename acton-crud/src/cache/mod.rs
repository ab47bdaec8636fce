//! Named cache stores
//!
//! A cache store holds any number of named caches, each mapping string keys to
//! serialized values. Put and evict are atomic per key; nothing spans keys.
//!
//! - [`MemoryCacheStore`]: process-local, always available
//! - [`RedisCacheStore`]: shared, behind the `redis` feature

#[cfg(feature = "redis")]
mod redis;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::Result;

#[cfg(feature = "redis")]
pub use self::redis::{create_pool, RedisCacheStore};

/// Storage behind the caching interceptor
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Cached value, if any
    async fn get(&self, name: &str, key: &str) -> Result<Option<Value>>;

    /// Store a value, replacing any previous one
    async fn put(&self, name: &str, key: &str, value: Value) -> Result<()>;

    /// Remove one entry
    async fn evict(&self, name: &str, key: &str) -> Result<()>;

    /// Remove every entry of a cache
    async fn clear(&self, name: &str) -> Result<()>;
}

/// In-memory cache store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: DashMap<String, DashMap<String, Value>>,
}

impl MemoryCacheStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a cache
    pub fn len(&self, name: &str) -> usize {
        self.caches.get(name).map_or(0, |cache| cache.len())
    }

    /// Whether a cache has no entries
    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, name: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .caches
            .get(name)
            .and_then(|cache| cache.get(key).map(|value| value.clone())))
    }

    async fn put(&self, name: &str, key: &str, value: Value) -> Result<()> {
        self.caches
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn evict(&self, name: &str, key: &str) -> Result<()> {
        if let Some(cache) = self.caches.get(name) {
            cache.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<()> {
        if let Some(cache) = self.caches.get(name) {
            cache.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_evict() {
        let store = MemoryCacheStore::new();
        assert!(store.get("employees", "7").await.unwrap().is_none());

        store.put("employees", "7", json!({"id": 7})).await.unwrap();
        assert_eq!(
            store.get("employees", "7").await.unwrap(),
            Some(json!({"id": 7}))
        );
        assert!(store.get("departments", "7").await.unwrap().is_none());

        store.evict("employees", "7").await.unwrap();
        assert!(store.get("employees", "7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_cache() {
        let store = MemoryCacheStore::new();
        store.put("employeesAll", "a", json!(1)).await.unwrap();
        store.put("employeesAll", "b", json!(2)).await.unwrap();
        store.put("employees", "a", json!(3)).await.unwrap();

        store.clear("employeesAll").await.unwrap();
        assert!(store.is_empty("employeesAll"));
        assert_eq!(store.len("employees"), 1);

        // clearing an unknown cache is a no-op
        store.clear("unknown").await.unwrap();
    }
}
