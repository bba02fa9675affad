//! Redis cache store implementation

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, error, info, instrument};

use enricher_core::traits::CacheStore;
use enricher_errors::{EnricherError, EnricherResult};

const SCAN_BATCH: usize = 1000;
const DELETE_BATCH: usize = 100;

/// Redis-backed cache store
///
/// Built explicitly by the bootstrap with [`RedisCacheStore::connect`] and
/// injected into the [`CacheLayer`](super::CacheLayer). The underlying
/// `ConnectionManager` reconnects on its own and is cheap to clone.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisCacheStore {
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> EnricherResult<Self> {
        info!("Creating Redis cache store with URL: {}", url);

        let client = redis::Client::open(url).map_err(cache_error)?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(cache_error)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        info!("Redis cache store connected");

        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    /// Releases this handle. The socket closes once every clone is dropped.
    pub async fn close(self) {
        debug!("Closing Redis cache store");
        drop(self.conn);
    }

    fn build_key(&self, key: &str) -> String {
        build_prefixed_key(&self.key_prefix, key)
    }
}

fn build_prefixed_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}:{key}")
    }
}

fn cache_error(e: redis::RedisError) -> EnricherError {
    if e.is_timeout() {
        EnricherError::timeout_error(e.to_string())
    } else if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        EnricherError::network(e.to_string())
    } else {
        EnricherError::cache(e.to_string())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> EnricherResult<Option<String>> {
        let full_key = self.build_key(key);
        debug!("Cache GET: {}", full_key);

        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache GET failed for key {}: {}", full_key, e);
                cache_error(e)
            })?;

        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> EnricherResult<()> {
        let full_key = self.build_key(key);
        debug!("Cache SET: {} with TTL: {:?}", full_key, ttl);

        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SETEX")
            .arg(&full_key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache SET failed for key {}: {}", full_key, e);
                cache_error(e)
            })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> EnricherResult<bool> {
        let full_key = self.build_key(key);
        debug!("Cache DELETE: {}", full_key);

        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache DELETE failed for key {}: {}", full_key, e);
                cache_error(e)
            })?;

        Ok(removed > 0)
    }

    #[instrument(skip(self))]
    async fn delete_pattern(&self, pattern: &str) -> EnricherResult<usize> {
        let full_pattern = self.build_key(pattern);
        debug!("Cache DELETE_PATTERN: {}", full_pattern);

        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    error!("Cache SCAN failed for pattern {}: {}", full_pattern, e);
                    cache_error(e)
                })?;

            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        if keys.is_empty() {
            debug!("No keys found for pattern: {}", full_pattern);
            return Ok(0);
        }

        let mut deleted = 0usize;
        for chunk in keys.chunks(DELETE_BATCH) {
            let removed: usize = redis::cmd("DEL")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    error!("Cache batch DELETE failed for pattern {}: {}", full_pattern, e);
                    cache_error(e)
                })?;
            deleted += removed;
        }

        debug!("Cache DELETE_PATTERN success: {} keys deleted", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> EnricherResult<bool> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache health check failed: {}", e);
                cache_error(e)
            })?;

        Ok(reply == "PONG")
    }
}
