//! # enricher-core
//!
//! 任务编排层的核心库：数据模型、外部协作方的端口接口、重试执行器和配置。
//!
//! - [`models`] 任务记录、分页游标、任务参数与结果、关联上下文
//! - [`traits`] 任务存储、日志/告警存储、缓存存储和电商平台客户端接口
//! - [`retry`] 带指数退避和抖动的重试执行器
//! - [`config`] 应用配置的加载与验证

pub mod config;
pub mod models;
pub mod retry;
pub mod traits;

pub use config::AppConfig;
pub use enricher_errors::{EnricherError, EnricherResult};
pub use retry::{with_retry, RetryConfig, RetryPolicy, RetryableError};
