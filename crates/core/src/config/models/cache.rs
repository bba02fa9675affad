use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 各命名空间的缓存过期时间（秒）
///
/// 库存数据变化快，TTL短；计算出的聚合指标变化慢，TTL长。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub products_seconds: u64,
    pub orders_seconds: u64,
    pub metrics_seconds: u64,
    pub system_status_seconds: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            products_seconds: 300,
            orders_seconds: 120,
            metrics_seconds: 900,
            system_status_seconds: 60,
        }
    }
}

impl CacheTtlConfig {
    pub fn products(&self) -> Duration {
        Duration::from_secs(self.products_seconds)
    }

    pub fn orders(&self) -> Duration {
        Duration::from_secs(self.orders_seconds)
    }

    pub fn metrics(&self) -> Duration {
        Duration::from_secs(self.metrics_seconds)
    }

    pub fn system_status(&self) -> Duration {
        Duration::from_secs(self.system_status_seconds)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// `redis://` 使用Redis，`memory://` 使用进程内缓存
    pub url: String,
    pub key_prefix: String,
    /// 缓存不可用时降级为直接请求
    pub fail_open: bool,
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "memory://".to_string(),
            key_prefix: "enricher".to_string(),
            fail_open: true,
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn is_memory(&self) -> bool {
        self.url == "memory://"
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if !self.is_memory()
            && !self.url.starts_with("redis://")
            && !self.url.starts_with("rediss://")
        {
            return Err(anyhow::anyhow!("缓存URL必须是Redis格式或 memory://"));
        }

        let ttl = &self.ttl;
        if ttl.products_seconds == 0
            || ttl.orders_seconds == 0
            || ttl.metrics_seconds == 0
            || ttl.system_status_seconds == 0
        {
            return Err(anyhow::anyhow!("缓存TTL必须大于0"));
        }

        Ok(())
    }
}
