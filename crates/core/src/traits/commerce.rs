use async_trait::async_trait;
use serde_json::Value;

use enricher_errors::EnricherResult;

/// 电商平台客户端接口
///
/// 平台只暴露一个操作：执行查询文档并返回JSON。商品/订单读取和标签写入
/// 都通过它完成，编排层不关心传输方式、认证和查询语言。
///
/// 实现需要把传输层失败映射为可重试的错误类型（`Network`、`Timeout`、
/// `RateLimited`、5xx 的 `Http`），以便重试执行器识别。
#[async_trait]
pub trait CommerceClient: Send + Sync {
    /// 执行查询，返回响应中的 `data` 部分
    async fn query(&self, document: &str, variables: Value) -> EnricherResult<Value>;
}
