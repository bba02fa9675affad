use std::time::Duration;

use async_trait::async_trait;

use enricher_errors::EnricherResult;

/// 缓存存储接口
///
/// 实现由启动流程显式构造并注入缓存层，连接的建立和关闭也由启动流程负责。
/// 存储层的错误原样返回，是否降级由缓存层的策略决定。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> EnricherResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> EnricherResult<()>;

    /// 删除单个键，返回键是否存在
    async fn delete(&self, key: &str) -> EnricherResult<bool>;

    /// 按glob模式删除，返回删除的键数量
    ///
    /// 模式支持 `*` 和 `?`，例如 `products:*`。
    async fn delete_pattern(&self, pattern: &str) -> EnricherResult<usize>;

    async fn health_check(&self) -> EnricherResult<bool>;
}
