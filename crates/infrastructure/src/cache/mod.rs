//! Caching infrastructure for the enrichment pipeline
//!
//! Cache entries are keyed by namespace (`products:`, `orders:`, `metrics:`,
//! `system-status:`) so a write can invalidate every read it may have made
//! stale with a single pattern deletion. The cache is strictly an
//! optimization: [`CacheLayer`] degrades to direct fetches when the store
//! misbehaves and its policy is fail-open.

pub mod layer;
pub mod memory_store;
pub mod redis_store;

pub use layer::{CacheLayer, CachePolicy, Memoized};
pub use memory_store::InMemoryCacheStore;
pub use redis_store::RedisCacheStore;

pub use enricher_core::config::CacheTtlConfig;

/// Cache key namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    Products,
    Orders,
    Metrics,
    SystemStatus,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Products => "products",
            CacheNamespace::Orders => "orders",
            CacheNamespace::Metrics => "metrics",
            CacheNamespace::SystemStatus => "system-status",
        }
    }

    /// Glob pattern matching every key of the namespace
    pub fn pattern(&self) -> String {
        format!("{}:*", self.as_str())
    }
}

/// Cache statistics and metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        let total_ops = self.hits + self.misses + self.sets + self.deletes;
        if total_ops == 0 {
            0.0
        } else {
            self.errors as f64 / total_ops as f64
        }
    }
}

const START_CURSOR: &str = "start";

/// Build cache key with multiple segments
pub fn build_cache_key(namespace: CacheNamespace, segments: &[&str]) -> String {
    format!("{}:{}", namespace.as_str(), segments.join(":"))
}

/// `products:<limit>:<cursor>`
pub fn products_key(limit: u32, cursor: Option<&str>) -> String {
    build_cache_key(
        CacheNamespace::Products,
        &[&limit.to_string(), cursor.unwrap_or(START_CURSOR)],
    )
}

/// `orders:<sinceDate>:<cursor>`
pub fn orders_key(since_date: &str, cursor: Option<&str>) -> String {
    build_cache_key(
        CacheNamespace::Orders,
        &[since_date, cursor.unwrap_or(START_CURSOR)],
    )
}

/// `metrics:<productIds>:<orderCount>`
pub fn metrics_key(product_ids: &[String], order_count: usize) -> String {
    build_cache_key(
        CacheNamespace::Metrics,
        &[&product_ids.join(","), &order_count.to_string()],
    )
}

/// `system-status:<shop>`
pub fn system_status_key(shop: &str) -> String {
    build_cache_key(CacheNamespace::SystemStatus, &[shop])
}

/// `system-status:<shop>:<limit>:<sinceDays>`, one entry per analysis window
pub fn analysis_status_key(shop: &str, limit: u32, since_days: u32) -> String {
    format!("{}:{limit}:{since_days}", system_status_key(shop))
}

/// Glob matching with `*` (any run) and `?` (single character)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_text = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_text = t;
            p += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            star_text += 1;
            t = star_text;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
