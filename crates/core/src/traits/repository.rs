//! 持久化端口定义
//!
//! 编排层只通过以下窄接口访问外部存储：
//! - 任务存储接口 (JobStore)
//! - 结构化日志存储接口 (LogStore)
//! - 告警存储接口 (AlertStore)
//!
//! ## 设计原则
//!
//! ### 幂等写入
//! `JobStore::upsert` 必须按主键原子执行。并发触发的两次运行使用不同的任务ID，
//! 只会通过存储自身的原子性在同一行上竞争，最后一次写入生效。
//!
//! ### 只追加
//! 日志和告警存储只追加不修改，编排层只需要 `append(record) -> id`，
//! 查询方法仅供审计接口使用。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use enricher_core::traits::JobStore;
//! use enricher_core::models::{JobRecord, JobStatus, JobType};
//!
//! async fn record_running(store: &dyn JobStore) -> EnricherResult<JobRecord> {
//!     let record = JobRecord::new("job-1", "demo.myshopify.com", JobType::AutoTagProducts, JobStatus::Running);
//!     store.upsert(&record).await
//! }
//! ```

use async_trait::async_trait;

use crate::models::{AlertRecord, JobRecord, LogRecord};
use enricher_errors::EnricherResult;

/// 任务存储接口
///
/// 任务记录以全局唯一的字符串ID为主键，核心层从不删除记录。
///
/// # 线程安全
///
/// 此trait要求实现 `Send + Sync`，同一个存储实例被所有并发运行共享。
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 根据ID查找任务记录
    ///
    /// 未找到时返回 `None`，只有存储本身不可用时才返回错误。
    async fn find(&self, id: &str) -> EnricherResult<Option<JobRecord>>;

    /// 创建新的任务记录
    ///
    /// # 错误
    ///
    /// * `DatabaseOperation` - 相同ID的记录已存在或写入失败
    async fn create(&self, record: &JobRecord) -> EnricherResult<JobRecord>;

    /// 按ID插入或更新任务记录
    ///
    /// 记录不存在时创建，存在时覆盖除 `created_at` 之外的全部字段。
    /// 对同一个ID重复调用只会产生一条记录。
    async fn upsert(&self, record: &JobRecord) -> EnricherResult<JobRecord>;
}

/// 结构化日志存储接口
#[async_trait]
pub trait LogStore: Send + Sync {
    /// 追加一条日志记录，返回存储分配的ID
    async fn append(&self, record: &LogRecord) -> EnricherResult<i64>;

    /// 按关联ID查询一次运行的全部日志，按时间先后排序
    async fn find_by_correlation(&self, correlation_id: &str) -> EnricherResult<Vec<LogRecord>>;
}

/// 告警存储接口
///
/// 告警与普通日志分开存储，运维面板可以直接列出需要关注的事件。
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn append(&self, record: &AlertRecord) -> EnricherResult<i64>;

    /// 最近的告警，新的在前
    async fn list_recent(&self, limit: usize) -> EnricherResult<Vec<AlertRecord>>;

    async fn find_by_correlation(&self, correlation_id: &str)
        -> EnricherResult<Vec<AlertRecord>>;
}
