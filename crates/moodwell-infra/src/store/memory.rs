//! In-memory store - single-instance deployments and fallback when Redis is unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use moodwell_core::ports::{Clock, Store, StoreError, SystemClock, UpdateFn};

struct Slot {
    value: String,
    expires_at: Option<i64>,
}

impl Slot {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// In-memory store on a sharded `DashMap`.
///
/// `update` holds the key's shard lock for the whole read-modify-write, so
/// concurrent updates to one key never interleave. Expired keys are dropped
/// when read and by [`Store::sweep`].
/// Note: Data is lost on process restart.
pub struct InMemoryStore {
    entries: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of slots held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expiry(&self, now: i64, ttl: Option<Duration>) -> Option<i64> {
        ttl.map(|d| now + d.as_millis() as i64)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();
        // Removes the slot only if it is still expired under the shard lock.
        if self
            .entries
            .remove_if(key, |_, slot| slot.is_expired(now))
            .is_some()
        {
            return Ok(None);
        }

        Ok(self.entries.get(key).map(|slot| slot.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = self.expiry(self.clock.now_millis(), ttl);
        self.entries.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_expired(now) {
                    None
                } else {
                    Some(occupied.get().value.clone())
                };

                match f(current)? {
                    Some(write) => {
                        occupied.insert(Slot {
                            value: write.value.clone(),
                            expires_at: self.expiry(now, write.ttl),
                        });
                        Ok(Some(write.value))
                    }
                    None => {
                        if occupied.get().is_expired(now) {
                            occupied.remove();
                        }
                        Ok(None)
                    }
                }
            }
            Entry::Vacant(vacant) => match f(None)? {
                Some(write) => {
                    vacant.insert(Slot {
                        value: write.value.clone(),
                        expires_at: self.expiry(now, write.ttl),
                    });
                    Ok(Some(write.value))
                }
                None => Ok(None),
            },
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .iter()
            .filter(|slot| slot.key().starts_with(prefix) && !slot.value().is_expired(now))
            .map(|slot| slot.key().clone())
            .collect())
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        self.entries.retain(|_, slot| {
            let keep = !slot.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodwell_core::ports::{ManualClock, StoreWrite};

    fn store() -> (InMemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (InMemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _) = store();
        store.set("key1", "value1", None).await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _) = store();
        store.set("key1", "value1", None).await.unwrap();
        assert!(store.delete("key1").await.unwrap());
        assert!(!store.delete("key1").await.unwrap());
        assert_eq!(store.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_absent_and_is_evicted() {
        let (store, clock) = store();
        store
            .set("key1", "value1", Some(Duration::from_secs(10)))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(9_999));
        assert!(store.get("key1").await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert_eq!(store.get("key1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_sees_previous_value() {
        let (store, _) = store();

        for _ in 0..3 {
            store
                .update(
                    "counter",
                    Box::new(|current| {
                        let n: u32 = current.map(|v| v.parse().unwrap()).unwrap_or(0);
                        Ok(Some(StoreWrite::new((n + 1).to_string(), None)))
                    }),
                )
                .await
                .unwrap();
        }

        assert_eq!(store.get("counter").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_update_can_decline_to_write() {
        let (store, _) = store();
        let written = store
            .update("missing", Box::new(|_| Ok(None)))
            .await
            .unwrap();
        assert_eq!(written, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_treats_expired_value_as_absent() {
        let (store, clock) = store();
        store
            .set("k", "old", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));

        let seen = store
            .update(
                "k",
                Box::new(|current| {
                    assert_eq!(current, None);
                    Ok(Some(StoreWrite::new("new", None)))
                }),
            )
            .await
            .unwrap();
        assert_eq!(seen, Some("new".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let store = Arc::new(InMemoryStore::new());

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update(
                            "hits",
                            Box::new(|current| {
                                let n: u32 = current.map(|v| v.parse().unwrap()).unwrap_or(0);
                                Ok(Some(StoreWrite::new((n + 1).to_string(), None)))
                            }),
                        )
                        .await
                        .unwrap();
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get("hits").await.unwrap(), Some("200".to_string()));
    }

    #[tokio::test]
    async fn test_keys_by_prefix_and_sweep() {
        let (store, clock) = store();
        store.set("cache:a", "1", None).await.unwrap();
        store
            .set("cache:b", "2", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.set("ratelimit:a", "3", None).await.unwrap();

        let mut keys = store.keys("cache:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache:a", "cache:b"]);

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.keys("cache:").await.unwrap(), vec!["cache:a"]);
        assert_eq!(store.sweep().await.unwrap(), 1);
        assert_eq!(store.len(), 2);
    }
}
