//! # 数据模型
//!
//! 定义任务编排层的核心数据结构：任务记录、分页游标、任务参数与结果、
//! 商品目录读模型、关联上下文以及结构化日志/告警记录。
//!
//! ## 设计原则
//!
//! - 所有时间字段使用 `DateTime<Utc>`
//! - 状态字段使用枚举类型，状态迁移只能前进
//! - 每种任务的参数和结果都有独立的结构体，
//!   只有在持久化边界才序列化为 `JobRecord` 中的 JSON

pub mod catalog;
pub mod correlation;
pub mod cursor;
pub mod job;
pub mod log;
pub mod options;

pub use catalog::{compute_metrics, LineItem, MetricsMap, Order, Page, Product, ProductMetrics};
pub use correlation::CorrelationContext;
pub use cursor::CursorPair;
pub use job::{JobRecord, JobStatus, JobType};
pub use log::{AlertRecord, LogCategory, LogRecord, Metadata, Severity};
pub use options::{
    AnalysisOptions, AnalysisResult, JobDefaults, JobOptions, JobPayload, TaggingOptions,
    TaggingResult, TriggerParams, MAX_PAGE_SIZE,
};
