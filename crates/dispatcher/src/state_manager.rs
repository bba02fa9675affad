use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use enricher_core::models::{
    CorrelationContext, JobPayload, JobRecord, JobStatus, JobType, LogCategory, Severity,
};
use enricher_core::retry::{with_retry, RetryConfig, RetryPolicy};
use enricher_core::traits::JobStore;
use enricher_errors::{EnricherError, EnricherResult};
use enricher_observability::{to_metadata, AlertManager};

/// 状态更新附带的字段
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    /// 失败时写入 `error`
    pub message: Option<String>,
    pub payload: Option<Value>,
    pub result: Option<Value>,
}

impl StatusUpdate {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

/// 任务状态管理器
///
/// 负责任务记录的生命周期持久化。存储写入失败会按记账重试策略重试，
/// 仍然失败时返回内存中的替代记录并发出系统告警，记账失败绝不阻断实际任务。
pub struct JobStateManager {
    jobs: Arc<dyn JobStore>,
    retry: RetryConfig,
    alerts: Option<Arc<AlertManager>>,
}

impl JobStateManager {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            jobs,
            retry: RetryConfig::bookkeeping(),
            alerts: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<AlertManager>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    fn policy(&self, job_id: &str) -> RetryPolicy {
        let job_id = job_id.to_string();
        RetryPolicy::new(self.retry.clone()).on_retry(move |error, attempt, delay| {
            warn!(
                job.id = %job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "任务存储写入失败，准备重试: {}",
                error
            );
        })
    }

    /// 更新任务状态，记录不存在时以该状态创建
    pub async fn update_status(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        status: JobStatus,
        message: Option<&str>,
    ) -> JobRecord {
        let update = StatusUpdate {
            message: message.map(str::to_string),
            ..Default::default()
        };
        self.record_status(ctx, job_type, status, update).await
    }

    pub async fn record_status(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        status: JobStatus,
        update: StatusUpdate,
    ) -> JobRecord {
        let job_id = ctx.job_id.as_str();
        let policy = self.policy(job_id);

        let existing = with_retry(|| self.jobs.find(job_id), &policy).await;
        let mut record = match existing {
            Ok(Some(mut record)) => {
                if !record.apply_status(status, update.message.as_deref()) {
                    warn!(
                        job.id = %job_id,
                        from = %record.status,
                        to = %status,
                        "拒绝非法的任务状态迁移"
                    );
                    return record;
                }
                record
            }
            Ok(None) => new_record(ctx, job_type, status, &update),
            Err(e) => {
                self.bookkeeping_failed(ctx, "find", status, &e).await;
                let mut record = new_record(ctx, job_type, status, &update);
                apply_fields(&mut record, &update);
                return record;
            }
        };

        apply_fields(&mut record, &update);

        match with_retry(|| self.jobs.upsert(&record), &policy).await {
            Ok(saved) => {
                debug!(job.id = %job_id, status = %saved.status, "任务状态已更新");
                saved
            }
            Err(e) => {
                self.bookkeeping_failed(ctx, "upsert", status, &e).await;
                record
            }
        }
    }

    async fn bookkeeping_failed(
        &self,
        ctx: &CorrelationContext,
        op: &'static str,
        status: JobStatus,
        error: &EnricherError,
    ) {
        warn!(job.id = %ctx.job_id, op, status = %status, "任务状态写入失败，使用内存记录继续: {}", error);
        metrics::counter!("enricher_bookkeeping_failures_total", "op" => op).increment(1);

        if let Some(alerts) = &self.alerts {
            alerts
                .raise(
                    ctx,
                    LogCategory::System,
                    Severity::Warning,
                    "任务状态写入失败",
                    &format!("任务 {} 的 {} 状态未能持久化: {}", ctx.job_id, status, error),
                    to_metadata(json!({
                        "operation": op,
                        "status": status.as_str(),
                        "errorType": error.signature(),
                    })),
                )
                .await;
        }
    }

    /// 为续跑创建 `scheduled` 状态的新任务记录
    ///
    /// 记录只表达继续执行的意图，由外部触发器负责再次调用。
    pub async fn schedule_follow_up(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        payload: &JobPayload,
    ) -> EnricherResult<JobRecord> {
        let record = JobRecord::new(&ctx.job_id, &ctx.shop, job_type.clone(), JobStatus::Scheduled)
            .with_payload(payload.to_value()?);

        let created = with_retry(|| self.jobs.create(&record), &self.policy(&ctx.job_id)).await?;
        info!(
            job.id = %created.id,
            parent_job_id = ctx.parent_job_id.as_deref().unwrap_or("-"),
            "已创建续跑任务"
        );
        Ok(created)
    }

    pub async fn find(&self, job_id: &str) -> EnricherResult<Option<JobRecord>> {
        with_retry(|| self.jobs.find(job_id), &self.policy(job_id)).await
    }
}

fn new_record(
    ctx: &CorrelationContext,
    job_type: &JobType,
    status: JobStatus,
    update: &StatusUpdate,
) -> JobRecord {
    let mut record = JobRecord::new(&ctx.job_id, &ctx.shop, job_type.clone(), status);
    if status == JobStatus::Failed {
        record.error = update.message.clone();
    }
    record
}

fn apply_fields(record: &mut JobRecord, update: &StatusUpdate) {
    if let Some(payload) = &update.payload {
        record.payload = payload.clone();
    }
    if let Some(result) = &update.result {
        record.result = Some(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enricher_infrastructure::database::InMemoryJobStore;
    use enricher_infrastructure::database::{InMemoryAlertStore, InMemoryLogStore};
    use enricher_observability::EventLogger;
    use enricher_testing_utils::{fast_retry, FlakyJobStore, RecordingChannel};
    use serde_json::json;

    const SHOP: &str = "demo.myshopify.com";

    fn ctx(job_id: &str) -> CorrelationContext {
        CorrelationContext::new(SHOP).with_job_id(job_id)
    }

    #[tokio::test]
    async fn test_update_status_is_idempotent() {
        let store = Arc::new(InMemoryJobStore::new());
        let manager = JobStateManager::new(store.clone());

        let first = manager
            .update_status(&ctx("job-1"), &JobType::AutoTagProducts, JobStatus::Running, None)
            .await;
        let second = manager
            .update_status(&ctx("job-1"), &JobType::AutoTagProducts, JobStatus::Running, None)
            .await;

        assert_eq!(store.len().await, 1);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_running_then_completed() {
        let store = Arc::new(InMemoryJobStore::new());
        let manager = JobStateManager::new(store.clone());

        manager
            .record_status(
                &ctx("job-2"),
                &JobType::InventoryAnalysis,
                JobStatus::Running,
                StatusUpdate::default().with_payload(json!({"jobType": "inventory-analysis"})),
            )
            .await;
        let done = manager
            .record_status(
                &ctx("job-2"),
                &JobType::InventoryAnalysis,
                JobStatus::Completed,
                StatusUpdate::default().with_result(json!({"productsAnalyzed": 3})),
            )
            .await;

        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.payload["jobType"], json!("inventory-analysis"));
        assert_eq!(done.result, Some(json!({"productsAnalyzed": 3})));
    }

    #[tokio::test]
    async fn test_failed_records_error_message() {
        let manager = JobStateManager::new(Arc::new(InMemoryJobStore::new()));

        manager
            .update_status(&ctx("job-3"), &JobType::AutoTagProducts, JobStatus::Running, None)
            .await;
        let failed = manager
            .update_status(
                &ctx("job-3"),
                &JobType::AutoTagProducts,
                JobStatus::Failed,
                Some("platform unavailable"),
            )
            .await;

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("platform unavailable"));
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_is_kept() {
        let manager = JobStateManager::new(Arc::new(InMemoryJobStore::new()));

        manager
            .update_status(&ctx("job-4"), &JobType::AutoTagProducts, JobStatus::Completed, None)
            .await;
        let after = manager
            .update_status(&ctx("job-4"), &JobType::AutoTagProducts, JobStatus::Running, None)
            .await;

        assert_eq!(after.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_store_outage_returns_synthetic_record() {
        let store = Arc::new(FlakyJobStore::always_failing());
        let manager = JobStateManager::new(store.clone()).with_retry(fast_retry());

        let record = manager
            .update_status(&ctx("job-5"), &JobType::AutoTagProducts, JobStatus::Running, None)
            .await;

        assert_eq!(record.id, "job-5");
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn test_store_outage_raises_correlated_alert() {
        let channel = Arc::new(RecordingChannel::new());
        let logger = Arc::new(EventLogger::new(Arc::new(InMemoryLogStore::new())));
        let mut alerts = AlertManager::new(logger, Arc::new(InMemoryAlertStore::new()));
        alerts.add_notification_channel(channel.clone());
        let manager = JobStateManager::new(Arc::new(FlakyJobStore::always_failing()))
            .with_retry(fast_retry())
            .with_alerts(Arc::new(alerts));
        let run = ctx("job-8");

        manager
            .update_status(&run, &JobType::AutoTagProducts, JobStatus::Running, None)
            .await;

        let raised = channel.alerts();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, LogCategory::System);
        assert_eq!(raised[0].severity, Severity::Warning);
        assert_eq!(raised[0].correlation_id, run.correlation_id);
        assert_eq!(raised[0].metadata["operation"], json!("find"));
    }

    #[tokio::test]
    async fn test_transient_store_failure_is_retried() {
        let store = Arc::new(FlakyJobStore::new(1));
        let manager = JobStateManager::new(store.clone()).with_retry(fast_retry());

        manager
            .update_status(&ctx("job-6"), &JobType::AutoTagProducts, JobStatus::Running, None)
            .await;

        assert!(store.inner().find("job-6").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_schedule_follow_up_creates_scheduled_record() {
        let store = Arc::new(InMemoryJobStore::new());
        let manager = JobStateManager::new(store.clone());
        let parent = CorrelationContext::new(SHOP).with_job_id("job-7");
        let child = parent.follow_up("job-7-next");
        let payload = JobPayload::new(JobType::AutoTagProducts, &json!({"productCursor": "cursor-2"}))
            .unwrap()
            .with_parent("job-7");

        let record = manager
            .schedule_follow_up(&child, &JobType::AutoTagProducts, &payload)
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Scheduled);
        assert_eq!(record.payload["parentJobId"], json!("job-7"));
        assert_eq!(record.payload["options"]["productCursor"], json!("cursor-2"));
    }
}
