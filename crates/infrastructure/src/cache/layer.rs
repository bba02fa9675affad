//! Read-through cache layer with an explicit failure policy

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use enricher_core::config::{CacheConfig, CacheTtlConfig};
use enricher_core::retry::{with_retry, RetryConfig, RetryPolicy, RetryableError};
use enricher_core::traits::CacheStore;
use enricher_errors::{EnricherError, EnricherResult};

use super::CacheStats;

/// How the cache layer reacts to store failures
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Degrade to "absent" instead of surfacing the final error
    pub fail_open: bool,
    /// Retry budget applied to every store call
    pub retry: RetryConfig,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::fail_open()
    }
}

impl CachePolicy {
    pub fn fail_open() -> Self {
        Self {
            fail_open: true,
            retry: RetryConfig::cache(),
        }
    }

    pub fn strict() -> Self {
        Self {
            fail_open: false,
            retry: RetryConfig::cache(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Cache operations used by the pagination engine and job handlers
///
/// Wraps an injected [`CacheStore`]. Every store call goes through the retry
/// executor with the policy's small budget. A layer built with
/// [`CacheLayer::disabled`] behaves as a permanent miss.
#[derive(Clone)]
pub struct CacheLayer {
    store: Option<Arc<dyn CacheStore>>,
    policy: CachePolicy,
    ttl: CacheTtlConfig,
    stats: Arc<RwLock<CacheStats>>,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy, ttl: CacheTtlConfig) -> Self {
        Self {
            store: Some(store),
            policy,
            ttl,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    pub fn from_config(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        let policy = if config.fail_open {
            CachePolicy::fail_open()
        } else {
            CachePolicy::strict()
        };
        Self::new(store, policy, config.ttl.clone())
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            policy: CachePolicy::default(),
            ttl: CacheTtlConfig::default(),
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self) -> &CacheTtlConfig {
        &self.ttl
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    fn retry_policy(&self, op: &'static str) -> RetryPolicy {
        RetryPolicy::new(self.policy.retry.clone()).on_retry(
            move |err: &dyn RetryableError, attempt, delay| {
                debug!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying cache operation: {}",
                    err
                );
            },
        )
    }

    async fn record_error(&self, op: &'static str, key: &str, err: &EnricherError) {
        self.stats.write().await.errors += 1;
        metrics::counter!("enricher_cache_errors_total", "op" => op).increment(1);
        warn!(op, key, "Cache operation failed: {}", err);
    }

    /// Returns the cached value, or `None` on a miss.
    ///
    /// Under a fail-open policy a store failure is reported as a miss.
    pub async fn get_cache(&self, key: &str) -> EnricherResult<Option<String>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        match with_retry(|| store.get(key), &self.retry_policy("get")).await {
            Ok(Some(value)) => {
                debug!("Cache HIT: {}", key);
                self.stats.write().await.hits += 1;
                metrics::counter!("enricher_cache_hits_total").increment(1);
                Ok(Some(value))
            }
            Ok(None) => {
                debug!("Cache MISS: {}", key);
                self.stats.write().await.misses += 1;
                metrics::counter!("enricher_cache_misses_total").increment(1);
                Ok(None)
            }
            Err(err) => {
                self.record_error("get", key, &err).await;
                if self.policy.fail_open {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Typed read. An entry that no longer decodes is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> EnricherResult<Option<T>> {
        let Some(raw) = self.get_cache(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, "Discarding undecodable cache entry: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn set_cache(&self, key: &str, value: &str, ttl: Duration) -> EnricherResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        match with_retry(|| store.set(key, value, ttl), &self.retry_policy("set")).await {
            Ok(()) => {
                self.stats.write().await.sets += 1;
                Ok(())
            }
            Err(err) => {
                self.record_error("set", key, &err).await;
                if self.policy.fail_open {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> EnricherResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set_cache(key, &raw, ttl).await
    }

    pub async fn delete_cache(&self, key: &str) -> EnricherResult<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };

        match with_retry(|| store.delete(key), &self.retry_policy("delete")).await {
            Ok(removed) => {
                if removed {
                    self.stats.write().await.deletes += 1;
                }
                Ok(removed)
            }
            Err(err) => {
                self.record_error("delete", key, &err).await;
                if self.policy.fail_open {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Deletes every key matching `pattern` (e.g. `products:*`).
    pub async fn delete_cache_pattern(&self, pattern: &str) -> EnricherResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        match with_retry(
            || store.delete_pattern(pattern),
            &self.retry_policy("delete_pattern"),
        )
        .await
        {
            Ok(count) => {
                debug!("Invalidated {} cache keys for {}", count, pattern);
                self.stats.write().await.deletes += count as u64;
                Ok(count)
            }
            Err(err) => {
                self.record_error("delete_pattern", pattern, &err).await;
                if self.policy.fail_open {
                    Ok(0)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Read-through: serve from cache on a hit, otherwise call `fetch` and
    /// populate the cache with the result.
    ///
    /// Errors from `fetch` are always returned; cache failures follow the policy.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> EnricherResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = EnricherResult<T>>,
    {
        if let Some(cached) = self.get_json::<T>(key).await? {
            return Ok(cached);
        }

        let value = fetch().await?;
        self.set_json(key, &value, ttl).await?;
        Ok(value)
    }

    /// Wraps `func` so results are cached under `<key_prefix>:<args>`.
    pub fn memoize<A, T, F, Fut>(
        &self,
        key_prefix: impl Into<String>,
        ttl: Duration,
        func: F,
    ) -> Memoized<A, T>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EnricherResult<T>> + Send + 'static,
    {
        Memoized {
            cache: self.clone(),
            key_prefix: key_prefix.into(),
            ttl,
            func: Arc::new(move |args| func(args).boxed()),
            _args: PhantomData,
        }
    }

    pub async fn health_check(&self) -> bool {
        match &self.store {
            Some(store) => store.health_check().await.unwrap_or(false),
            None => false,
        }
    }
}

type MemoizedFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, EnricherResult<T>> + Send + Sync>;

/// A function whose results are cached by argument
pub struct Memoized<A, T> {
    cache: CacheLayer,
    key_prefix: String,
    ttl: Duration,
    func: MemoizedFn<A, T>,
    _args: PhantomData<fn(A) -> T>,
}

impl<A, T> Clone for Memoized<A, T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key_prefix: self.key_prefix.clone(),
            ttl: self.ttl,
            func: Arc::clone(&self.func),
            _args: PhantomData,
        }
    }
}

impl<A, T> Memoized<A, T>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
{
    pub fn key_for(&self, args: &A) -> EnricherResult<String> {
        let suffix = match serde_json::to_value(args)? {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(format!("{}:{}", self.key_prefix, suffix))
    }

    pub async fn call(&self, args: A) -> EnricherResult<T> {
        let key = self.key_for(&args)?;
        let func = Arc::clone(&self.func);
        self.cache
            .get_or_fetch(&key, self.ttl, move || func(args))
            .await
    }
}
