//! 任务调度层
//!
//! 触发请求经 [`JobDispatcher`] 认证后交给注册表中的处理器执行，
//! 状态通过 [`JobStateManager`] 持久化，长任务由 [`BatchPaginationEngine`]
//! 分页推进并在需要时生成续跑记录。

pub mod dispatcher;
pub mod handlers;
pub mod pagination;
pub mod registry;
pub mod state_manager;

pub use dispatcher::{JobDispatcher, TriggerCredentials, TriggerRequest, TriggerResponse};
pub use handlers::{
    CatalogPageFetcher, InventoryAnalysisHandler, JobContext, JobFailure, JobHandler, JobOutput,
    RuleBasedTagAnalyzer, TagAnalyzer, TaggingHandler, TaggingProcessor,
};
pub use pagination::{
    BatchOutcome, BatchPage, BatchPaginationEngine, BatchProcessor, PageFetcher,
    PaginationFailure, PaginationOptions, PaginationOutcome,
};
pub use registry::JobRegistry;
pub use state_manager::{JobStateManager, StatusUpdate};
