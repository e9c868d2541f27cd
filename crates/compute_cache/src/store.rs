//! Pluggable persistence behind the computation cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use common::Error;

use crate::{CacheDomain, CacheEntry};

/// Backing store for cache entries. A database table in production, an
/// in-memory map in tests and single-node deployments. Writes are
/// single-entry overwrites; implementations must never let a reader observe
/// a half-deleted entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, domain: CacheDomain, key: &str) -> Result<Option<CacheEntry>, Error>;

    async fn put(&self, entry: CacheEntry) -> Result<(), Error>;

    /// Remove entries whose TTL elapsed before `now`; returns the count.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, Error>;
}

/// In-memory store on a sharded concurrent map. Lock-free reads on the hot
/// path; `retain` holds only one shard at a time during purges.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(CacheDomain, String), CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, domain: CacheDomain, key: &str) -> Result<Option<CacheEntry>, Error> {
        Ok(self
            .entries
            .get(&(domain, key.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), Error> {
        self.entries
            .insert((entry.domain, entry.key.clone()), entry);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, Error> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: CacheDomain, key: &str, ttl_seconds: u64, age_secs: i64) -> CacheEntry {
        CacheEntry {
            domain,
            key: key.into(),
            dims: String::new(),
            payload: serde_json::json!({"k": key}),
            created_at: Utc::now() - chrono::Duration::seconds(age_secs),
            ttl_seconds,
        }
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryStore::new();
        store
            .put(entry(CacheDomain::Ndvi, "a", 60, 0))
            .await
            .unwrap();

        let got = store.get(CacheDomain::Ndvi, "a").await.unwrap().unwrap();
        assert_eq!(got.payload, serde_json::json!({"k": "a"}));

        // Same key under a different domain is a distinct slot.
        assert!(store.get(CacheDomain::Model, "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_counts() {
        let store = MemoryStore::new();
        store
            .put(entry(CacheDomain::Ndvi, "fresh", 3600, 0))
            .await
            .unwrap();
        store
            .put(entry(CacheDomain::Ndvi, "stale", 60, 120))
            .await
            .unwrap();
        store
            .put(entry(CacheDomain::Model, "stale2", 10, 120))
            .await
            .unwrap();

        let removed = store.delete_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store
            .get(CacheDomain::Ndvi, "fresh")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get(CacheDomain::Ndvi, "stale")
            .await
            .unwrap()
            .is_none());
    }
}
