//! 按任务类型划分的处理器

pub mod analysis;
pub mod fetcher;
pub mod tagging;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use enricher_core::models::{
    AnalysisResult, CorrelationContext, CursorPair, JobOptions, JobPayload, JobType,
    TaggingResult,
};
use enricher_errors::{EnricherError, EnricherResult};
use enricher_observability::EventLogger;

pub use analysis::InventoryAnalysisHandler;
pub use fetcher::CatalogPageFetcher;
pub use tagging::{RuleBasedTagAnalyzer, TagAnalyzer, TaggingHandler, TaggingProcessor};

/// 处理器执行时可用的上下文
#[derive(Clone)]
pub struct JobContext {
    pub correlation: CorrelationContext,
    pub logger: Arc<EventLogger>,
}

impl JobContext {
    pub fn new(correlation: CorrelationContext, logger: Arc<EventLogger>) -> Self {
        Self {
            correlation,
            logger,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.correlation.job_id
    }
}

/// 任务执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobOutput {
    Tagging(TaggingResult),
    Analysis(AnalysisResult),
    Custom(Value),
}

impl JobOutput {
    pub fn processed_count(&self) -> Option<u64> {
        match self {
            JobOutput::Tagging(result) => Some(result.processed_count),
            JobOutput::Analysis(result) => Some(result.products_analyzed),
            JobOutput::Custom(_) => None,
        }
    }

    pub fn updated_count(&self) -> Option<u64> {
        match self {
            JobOutput::Tagging(result) => Some(result.updated_count),
            _ => None,
        }
    }

    pub fn batches_processed(&self) -> Option<u32> {
        match self {
            JobOutput::Tagging(result) => Some(result.batches_processed),
            JobOutput::Analysis(_) => Some(1),
            JobOutput::Custom(_) => None,
        }
    }

    pub fn has_more_data(&self) -> bool {
        match self {
            JobOutput::Tagging(result) => result.has_more_data,
            JobOutput::Analysis(result) => result.has_more_data,
            JobOutput::Custom(_) => false,
        }
    }

    /// 续跑任务的起点
    pub fn last_cursor(&self) -> Option<&CursorPair> {
        match self {
            JobOutput::Tagging(result) => result.last_cursor.as_ref(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> EnricherResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// 任务执行失败：原始错误加上已完成部分的检查点
#[derive(Debug)]
pub struct JobFailure {
    pub error: EnricherError,
    pub checkpoint: Option<CursorPair>,
    pub partial: Option<JobOutput>,
}

impl JobFailure {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "error": self.error.to_string(),
            "errorType": self.error.signature(),
            "checkpoint": self.checkpoint,
            "partial": self.partial,
        })
    }
}

impl From<EnricherError> for JobFailure {
    fn from(error: EnricherError) -> Self {
        Self {
            error,
            checkpoint: None,
            partial: None,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

/// 任务处理器
///
/// 每种任务类型一个实现，通过 [`JobRegistry`](crate::registry::JobRegistry) 注册。
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    /// 解析并校验选项，生成写入任务记录的载荷
    ///
    /// `resume_from` 不为空时生成从该检查点继续的续跑载荷。
    fn payload(&self, options: &JobOptions, resume_from: Option<&CursorPair>)
        -> EnricherResult<JobPayload>;

    async fn execute(&self, ctx: &JobContext, options: &JobOptions) -> Result<JobOutput, JobFailure>;
}
