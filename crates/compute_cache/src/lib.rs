//! TTL-bounded, content-addressable cache for expensive computations.
//!
//! Holds raw historical series and fitted-model state, keyed by
//! fingerprints derived in [`fingerprint`]. The cache is a pure
//! optimization: every store failure is logged and surfaces to callers as
//! a miss, never as an error. Entries are immutable once written — a
//! recomputation overwrites the slot with a fresh `created_at`.
//!
//! Concurrent misses for the same key may both recompute and both write;
//! the second write wins. There is no single-flight deduplication.

pub mod fingerprint;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::config::CacheTtlConfig;
use common::types::SeriesKind;

use store::CacheStore;

pub use store::MemoryStore;

// ── Domains ───────────────────────────────────────────────────────────

/// Namespace a cache entry lives in. Raw historical domains share one TTL;
/// the fitted-model domain uses a shorter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDomain {
    Ndvi,
    Evi,
    Savi,
    Weather,
    Model,
}

impl CacheDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDomain::Ndvi => "ndvi",
            CacheDomain::Evi => "evi",
            CacheDomain::Savi => "savi",
            CacheDomain::Weather => "weather",
            CacheDomain::Model => "model",
        }
    }
}

impl From<SeriesKind> for CacheDomain {
    fn from(kind: SeriesKind) -> Self {
        match kind {
            SeriesKind::Ndvi => CacheDomain::Ndvi,
            SeriesKind::Evi => CacheDomain::Evi,
            SeriesKind::Savi => CacheDomain::Savi,
            SeriesKind::Temperature | SeriesKind::Precipitation => CacheDomain::Weather,
        }
    }
}

// ── Entries ───────────────────────────────────────────────────────────

/// One cached computation. This is also the persisted shape, so every
/// field serializes to something a non-Rust reader can interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub domain: CacheDomain,
    pub key: String,
    /// Location/date-range discriminators, for observability.
    pub dims: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Duration::seconds(self.ttl_seconds as i64)
    }
}

// ── TTL policy ────────────────────────────────────────────────────────

/// Per-domain TTLs in seconds.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    raw_secs: u64,
    model_secs: u64,
}

impl TtlPolicy {
    pub fn from_config(cfg: &CacheTtlConfig) -> Self {
        Self {
            raw_secs: cfg.raw_ttl_days * 86_400,
            model_secs: cfg.model_ttl_days * 86_400,
        }
    }

    pub fn ttl_seconds(&self, domain: CacheDomain) -> u64 {
        match domain {
            CacheDomain::Model => self.model_secs,
            _ => self.raw_secs,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheTtlConfig::default())
    }
}

// ── Cache ─────────────────────────────────────────────────────────────

/// TTL-bounded store for raw historical payloads and fitted-model state.
pub struct ComputationCache {
    store: Arc<dyn CacheStore>,
    ttl: TtlPolicy,
}

impl ComputationCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: TtlPolicy) -> Self {
        Self { store, ttl }
    }

    pub fn in_memory(cfg: &CacheTtlConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), TtlPolicy::from_config(cfg))
    }

    /// Look up an entry. Returns it only while its TTL holds; an expired
    /// entry reads as absent (lazy expiry — active removal is
    /// [`purge_expired`](Self::purge_expired)'s job). Store failures are
    /// logged and read as a miss.
    pub async fn get(&self, domain: CacheDomain, key: &str) -> Option<CacheEntry> {
        let entry = match self.store.get(domain, key).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!("Cache read failed for {}:{}: {}", domain.as_str(), key, e);
                return None;
            }
        };

        if entry.is_expired(Utc::now()) {
            debug!("Cache entry expired: {}:{}", domain.as_str(), key);
            return None;
        }
        Some(entry)
    }

    /// Write or overwrite an entry with `created_at = now` and the
    /// domain's TTL. Store failures are logged and swallowed.
    pub async fn put(&self, domain: CacheDomain, key: &str, dims: &str, payload: serde_json::Value) {
        self.put_with_ttl(domain, key, dims, payload, self.ttl.ttl_seconds(domain))
            .await;
    }

    /// Like [`put`](Self::put) with an explicit TTL override.
    pub async fn put_with_ttl(
        &self,
        domain: CacheDomain,
        key: &str,
        dims: &str,
        payload: serde_json::Value,
        ttl_seconds: u64,
    ) {
        let entry = CacheEntry {
            domain,
            key: key.to_string(),
            dims: dims.to_string(),
            payload,
            created_at: Utc::now(),
            ttl_seconds,
        };
        if let Err(e) = self.store.put(entry).await {
            warn!("Cache write failed for {}:{}: {}", domain.as_str(), key, e);
        }
    }

    /// Actively remove entries past their TTL as of `now`. Safe to run
    /// concurrently with `get`/`put`. Returns the number removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        match self.store.delete_expired(now).await {
            Ok(count) => {
                if count > 0 {
                    debug!("Purged {} expired cache entries", count);
                }
                count
            }
            Err(e) => {
                warn!("Cache purge failed: {}", e);
                0
            }
        }
    }
}
