use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 关联上下文
///
/// 一次逻辑运行产生的所有日志、告警和任务记录都携带同一个 `correlation_id`，
/// 仅凭日志存储即可重建该运行的完整时间线。不持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub job_id: String,
    pub parent_job_id: Option<String>,
    pub shop: String,
}

impl CorrelationContext {
    /// 生成新的关联ID，任务ID默认与之相同
    pub fn new(shop: impl Into<String>) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        Self {
            job_id: correlation_id.clone(),
            correlation_id,
            parent_job_id: None,
            shop: shop.into(),
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    pub fn with_parent(mut self, parent_job_id: impl Into<String>) -> Self {
        self.parent_job_id = Some(parent_job_id.into());
        self
    }

    /// 续跑任务沿用同一个关联ID，父任务为当前任务
    pub fn follow_up(&self, job_id: impl Into<String>) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            job_id: job_id.into(),
            parent_job_id: Some(self.job_id.clone()),
            shop: self.shop.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_uses_correlation_id_as_job_id() {
        let ctx = CorrelationContext::new("demo.myshopify.com");
        assert_eq!(ctx.correlation_id, ctx.job_id);
        assert!(ctx.parent_job_id.is_none());
    }

    #[test]
    fn test_follow_up_keeps_correlation_id() {
        let ctx = CorrelationContext::new("demo.myshopify.com").with_job_id("job-1");
        let child = ctx.follow_up("job-2");
        assert_eq!(child.correlation_id, ctx.correlation_id);
        assert_eq!(child.job_id, "job-2");
        assert_eq!(child.parent_job_id.as_deref(), Some("job-1"));
    }
}
