use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

use moodwell_core::CacheError;
use moodwell_core::domain::key::CACHE_SCOPE;
use moodwell_core::domain::{CacheConfig, CachedResponse, Freshness, etag};
use moodwell_core::ports::{Clock, Store, StoreError, SystemClock};

/// Headers the cache layer sets itself, never replayed from a snapshot.
const RECOMPUTED_HEADERS: [&str; 9] = [
    "x-cache",
    "age",
    "etag",
    "cache-control",
    "pragma",
    "expires",
    "retry-after",
    "set-cookie",
    "content-length",
];

/// Whether a response header belongs in a [`CachedResponse`].
pub fn is_storable_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    !RECOMPUTED_HEADERS.contains(&name.as_str()) && !name.starts_with("x-ratelimit-")
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The client already holds this version. `stale` entries still need a
    /// background refresh.
    NotModified {
        etag: String,
        age_secs: u64,
        stale: bool,
    },
    Hit {
        entry: CachedResponse,
        age_secs: u64,
    },
    /// Past its ttl but inside the stale window: serve and refresh.
    Stale {
        entry: CachedResponse,
        age_secs: u64,
    },
    Miss,
}

/// Counters since startup (or the last [`ResponseCache::clear`]).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub stale: u64,
    pub misses: u64,
    pub not_modified: u64,
    /// Share of lookups answered without running the handler.
    pub hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    stale: AtomicU64,
    misses: AtomicU64,
    not_modified: AtomicU64,
}

/// HTTP response cache keyed by [`cache_key`](moodwell_core::domain::key::cache_key).
///
/// Entries are JSON-encoded [`CachedResponse`] values stored for
/// `ttl + stale window`; the store's own expiry removes them afterwards.
pub struct ResponseCache {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            counters: Counters::default(),
        }
    }

    fn scope_prefix() -> String {
        format!("{}:", CACHE_SCOPE)
    }

    async fn load(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Dropping unreadable cache entry");
                self.store.delete(key).await?;
                Ok(None)
            }
        }
    }

    /// Look `key` up and classify it against `config`.
    ///
    /// `if_none_match` is the raw request header; a validator matching the
    /// stored ETag short-circuits to [`CacheLookup::NotModified`] for both
    /// fresh and stale entries.
    pub async fn lookup(
        &self,
        key: &str,
        config: &CacheConfig,
        if_none_match: Option<&str>,
    ) -> Result<CacheLookup, CacheError> {
        let now = self.clock.now_millis();

        let entry = match self.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(CacheLookup::Miss);
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let age_secs = entry.age_secs(now);
        let freshness = entry.freshness(config, now);

        if freshness == Freshness::Expired {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheLookup::Miss);
        }

        if etag::if_none_match(if_none_match, &entry.etag) {
            self.counters.not_modified.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheLookup::NotModified {
                etag: entry.etag,
                age_secs,
                stale: freshness == Freshness::Stale,
            });
        }

        match freshness {
            Freshness::Fresh => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(CacheLookup::Hit { entry, age_secs })
            }
            _ => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                Ok(CacheLookup::Stale { entry, age_secs })
            }
        }
    }

    /// Snapshot a handler response under `key`.
    ///
    /// Returns `Ok(None)` without touching the store for non-2xx statuses.
    /// Headers the cache recomputes are dropped from the snapshot.
    pub async fn store(
        &self,
        key: &str,
        config: &CacheConfig,
        status: u16,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
    ) -> Result<Option<CachedResponse>, CacheError> {
        let headers = headers
            .into_iter()
            .filter(|(name, _)| is_storable_header(name))
            .collect();

        let Some(entry) = CachedResponse::capture(
            status,
            headers,
            body,
            self.clock.now_millis(),
            config.tags.clone(),
        ) else {
            return Ok(None);
        };

        let raw = serde_json::to_string(&entry).map_err(StoreError::from)?;
        self.store
            .set(key, &raw, Some(config.retention()))
            .await?;

        tracing::debug!(key = %key, etag = %entry.etag, ttl = config.ttl_seconds, "Cached response");
        Ok(Some(entry))
    }

    /// Remove every entry tagged `tag`. Returns how many were removed.
    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.store.keys(&Self::scope_prefix()).await? {
            let tagged = self
                .load(&key)
                .await?
                .is_some_and(|entry| entry.has_tag(tag));
            if tagged && self.store.delete(&key).await? {
                removed += 1;
            }
        }

        tracing::info!(tag = %tag, removed, "Invalidated cache entries by tag");
        Ok(removed)
    }

    /// Remove every entry whose key matches `pattern`.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let regex = Regex::new(pattern)?;

        let mut removed = 0;
        for key in self.store.keys(&Self::scope_prefix()).await? {
            if regex.is_match(&key) && self.store.delete(&key).await? {
                removed += 1;
            }
        }

        tracing::info!(pattern = %pattern, removed, "Invalidated cache entries by pattern");
        Ok(removed)
    }

    /// Drop every cached response and reset the counters.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.store.keys(&Self::scope_prefix()).await? {
            if self.store.delete(&key).await? {
                removed += 1;
            }
        }

        for counter in [
            &self.counters.hits,
            &self.counters.stale,
            &self.counters.misses,
            &self.counters.not_modified,
        ] {
            counter.store(0, Ordering::Relaxed);
        }

        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let stale = self.counters.stale.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let not_modified = self.counters.not_modified.load(Ordering::Relaxed);

        let served = hits + stale + not_modified;
        let total = served + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        };

        CacheStats {
            hits,
            stale,
            misses,
            not_modified,
            hit_rate,
        }
    }
}
