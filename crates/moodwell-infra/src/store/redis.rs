//! Redis store implementation with connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use moodwell_core::ports::{Store, StoreError, UpdateFn};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fallback to the in-memory store if Redis is unavailable
    pub fallback_to_memory: bool,
    /// Prefix prepended to every key, so several apps can share one Redis
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
            key_prefix: "moodwell".to_string(),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "moodwell".to_string()),
        }
    }
}

/// Redis-backed store.
///
/// Uses connection manager for automatic reconnection and pooling. TTLs are
/// applied with `PSETEX`, so Redis expires keys itself and [`Store::sweep`]
/// has nothing to do.
///
/// `update` is a plain GET followed by a write. Two instances updating the
/// same key at the same moment are last-writer-wins; for rate limiting this
/// can let a burst slightly exceed its limit.
pub struct RedisStore {
    conn: ConnectionManager,
    config: RedisConfig,
}

impl RedisStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "Connected to Redis store");

        Ok(Self { conn, config })
    }

    fn make_key(&self, key: &str) -> String {
        if self.config.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, key)
        }
    }

    fn strip_key<'a>(&self, key: &'a str) -> &'a str {
        if self.config.key_prefix.is_empty() {
            return key;
        }
        key.strip_prefix(&self.config.key_prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(key)
    }

    async fn write(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        match ttl {
            Some(duration) => {
                let millis = (duration.as_millis() as u64).max(1);
                conn.pset_ex::<_, _, ()>(key, value, millis)
                    .await
                    .map_err(|e| StoreError::Operation(e.to_string()))?;
            }
            None => {
                conn.set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| StoreError::Operation(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Escape glob metacharacters for `SCAN MATCH`.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(self.make_key(key))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.write(&mut conn, &self.make_key(key), value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(self.make_key(key))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<Option<String>, StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let current: Option<String> = conn
            .get(&redis_key)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        match f(current)? {
            Some(write) => {
                self.write(&mut conn, &redis_key, &write.value, write.ttl)
                    .await?;
                Ok(Some(write.value))
            }
            None => Ok(None),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}*", escape_glob(&self.make_key(prefix)));
        let mut conn = self.conn.clone();

        let mut iter = conn
            .scan_match::<_, String>(pattern)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(self.strip_key(&key).to_string());
        }

        Ok(keys)
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
