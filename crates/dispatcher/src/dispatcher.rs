use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use enricher_core::config::{AuthConfig, JobsConfig};
use enricher_core::models::{
    CorrelationContext, CursorPair, JobOptions, JobPayload, JobRecord, JobStatus, JobType,
    LogCategory, Metadata, Severity, TriggerParams,
};
use enricher_observability::{to_metadata, AlertManager, EventLogger, PerformanceMonitor};

use crate::handlers::{JobContext, JobFailure, JobHandler, JobOutput};
use crate::registry::JobRegistry;
use crate::state_manager::{JobStateManager, StatusUpdate};

/// 触发请求的身份信息
#[derive(Debug, Clone, Default)]
pub struct TriggerCredentials {
    pub api_key: Option<String>,
    pub remote_ip: Option<String>,
    /// 进程内触发（命令行）跳过校验
    pub trusted_local: bool,
}

impl TriggerCredentials {
    pub fn local() -> Self {
        Self {
            trusted_local: true,
            ..Default::default()
        }
    }
}

/// 一次触发
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub source: LogCategory,
    pub credentials: TriggerCredentials,
    pub params: TriggerParams,
}

impl TriggerRequest {
    pub fn cron(credentials: TriggerCredentials, params: TriggerParams) -> Self {
        Self {
            source: LogCategory::Cron,
            credentials,
            params,
        }
    }
}

/// 触发响应
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches_processed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more_data: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_job_id: Option<String>,
    /// 认证失败，HTTP 层据此返回 401
    #[serde(skip)]
    pub unauthorized: bool,
}

impl TriggerResponse {
    fn failure(request_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            request_id: request_id.to_string(),
            job_id: None,
            processed_count: None,
            updated_count: None,
            batches_processed: None,
            has_more_data: None,
            follow_up_job_id: None,
            unauthorized: false,
        }
    }

    fn completed(ctx: &CorrelationContext, job_type: &JobType, output: &JobOutput) -> Self {
        Self {
            success: true,
            message: format!("任务 {} 执行完成", job_type),
            job_id: Some(ctx.job_id.clone()),
            processed_count: output.processed_count(),
            updated_count: output.updated_count(),
            batches_processed: output.batches_processed(),
            has_more_data: Some(output.has_more_data()),
            ..Self::failure(&ctx.correlation_id, "")
        }
    }
}

/// 任务调度器
///
/// 触发入口：认证、解析任务类型、记录状态、执行处理器、告警和续跑。
/// 任何处理器错误都在这里转换为失败记录加告警，不会继续向上传播。
pub struct JobDispatcher {
    auth: AuthConfig,
    shop: String,
    registry: JobRegistry,
    state: JobStateManager,
    logger: Arc<EventLogger>,
    alerts: Arc<AlertManager>,
    monitor: PerformanceMonitor,
    jobs_config: JobsConfig,
}

impl JobDispatcher {
    pub fn new(
        auth: AuthConfig,
        shop: impl Into<String>,
        registry: JobRegistry,
        state: JobStateManager,
        alerts: Arc<AlertManager>,
        jobs_config: JobsConfig,
    ) -> Self {
        Self {
            auth,
            shop: shop.into(),
            registry,
            state: state.with_alerts(Arc::clone(&alerts)),
            logger: Arc::clone(alerts.logger()),
            monitor: PerformanceMonitor::new(Arc::clone(&alerts)),
            alerts,
            jobs_config,
        }
    }

    pub fn shop(&self) -> &str {
        &self.shop
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn state(&self) -> &JobStateManager {
        &self.state
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn logger(&self) -> &Arc<EventLogger> {
        &self.logger
    }

    fn is_authorized(&self, credentials: &TriggerCredentials) -> bool {
        credentials.trusted_local
            || credentials
                .api_key
                .as_deref()
                .is_some_and(|key| self.auth.accepts_key(key))
            || credentials
                .remote_ip
                .as_deref()
                .is_some_and(|ip| self.auth.trusts_ip(ip))
    }

    #[instrument(skip(self, request), fields(source = request.source.as_str()))]
    pub async fn handle_trigger(&self, request: TriggerRequest) -> TriggerResponse {
        let mut ctx = CorrelationContext::new(&self.shop);
        if let Some(job_id) = request.params.requested_job_id() {
            ctx = ctx.with_job_id(job_id);
        }

        self.logger
            .log_trigger_event(
                &ctx,
                request.source,
                "trigger_received",
                "收到任务触发",
                to_metadata(json!({
                    "job": request.params.job,
                    "remoteIp": request.credentials.remote_ip,
                    "hasApiKey": request.credentials.api_key.is_some(),
                })),
            )
            .await;

        if let Some(rejected) = self.authenticate(&ctx, request.source, &request.credentials).await {
            return rejected;
        }

        let Some(job_type) = request.params.job_type() else {
            return self
                .reject_job_type(&ctx, "缺少任务类型参数 job", Value::Null)
                .await;
        };
        let Some(handler) = self.registry.get(&job_type) else {
            let message = format!(
                "未知的任务类型: {}，可用类型: {}",
                job_type,
                self.registry.job_types().join(", ")
            );
            return self
                .reject_job_type(&ctx, &message, json!(job_type.as_str()))
                .await;
        };

        if request.params.requested_job_id().is_some() {
            if let Some(finished) = self.finished_job(&ctx).await {
                return self.reject_finished(&ctx, &finished).await;
            }
        }

        let options = JobOptions::new(request.params.clone(), self.jobs_config.defaults());
        self.run_job(&ctx, &job_type, handler.as_ref(), &options, request.params.is_full_sync())
            .await
    }

    /// 请求体无法解析时的入口：同样先认证，再返回带请求ID的失败响应
    #[instrument(skip(self, credentials), fields(source = source.as_str()))]
    pub async fn handle_malformed(
        &self,
        source: LogCategory,
        credentials: TriggerCredentials,
        reason: &str,
    ) -> TriggerResponse {
        let ctx = CorrelationContext::new(&self.shop);

        self.logger
            .log_trigger_event(
                &ctx,
                source,
                "trigger_received",
                "收到无法解析的任务触发",
                to_metadata(json!({
                    "remoteIp": credentials.remote_ip,
                    "hasApiKey": credentials.api_key.is_some(),
                    "reason": reason,
                })),
            )
            .await;

        if let Some(rejected) = self.authenticate(&ctx, source, &credentials).await {
            return rejected;
        }

        let message = format!("请求参数无法解析: {}", reason);
        warn!(request_id = %ctx.correlation_id, "{}", message);
        self.logger
            .log_trigger_event(&ctx, source, "trigger_rejected", &message, Metadata::new())
            .await;
        TriggerResponse::failure(&ctx.correlation_id, message)
    }

    /// 认证失败时记录安全告警并返回 401 响应
    async fn authenticate(
        &self,
        ctx: &CorrelationContext,
        source: LogCategory,
        credentials: &TriggerCredentials,
    ) -> Option<TriggerResponse> {
        if self.is_authorized(credentials) {
            return None;
        }

        warn!(request_id = %ctx.correlation_id, "触发请求认证失败");
        self.alerts
            .security_alert(
                ctx,
                "未授权的任务触发",
                "请求缺少有效的 API 密钥且来源不可信",
                to_metadata(json!({
                    "remoteIp": credentials.remote_ip,
                    "source": source.as_str(),
                })),
            )
            .await;
        Some(TriggerResponse {
            unauthorized: true,
            ..TriggerResponse::failure(&ctx.correlation_id, "未授权")
        })
    }

    /// 指定的任务ID已有结束状态的记录
    async fn finished_job(&self, ctx: &CorrelationContext) -> Option<JobRecord> {
        match self.state.find(&ctx.job_id).await {
            Ok(record) => record.filter(JobRecord::is_finished),
            Err(e) => {
                warn!(job.id = %ctx.job_id, "查询任务记录失败，按新任务执行: {}", e);
                None
            }
        }
    }

    async fn reject_finished(&self, ctx: &CorrelationContext, record: &JobRecord) -> TriggerResponse {
        let message = format!("任务 {} 已经结束（{}），不会重复执行", record.id, record.status);
        warn!(job.id = %ctx.job_id, "{}", message);
        self.alerts
            .raise(
                ctx,
                LogCategory::Job,
                Severity::Warning,
                "重复触发已结束的任务",
                &message,
                to_metadata(json!({
                    "jobType": record.job_type.as_str(),
                    "status": record.status.as_str(),
                })),
            )
            .await;
        TriggerResponse {
            job_id: Some(record.id.clone()),
            ..TriggerResponse::failure(&ctx.correlation_id, message)
        }
    }

    async fn reject_job_type(
        &self,
        ctx: &CorrelationContext,
        message: &str,
        job: Value,
    ) -> TriggerResponse {
        warn!(request_id = %ctx.correlation_id, "{}", message);
        self.alerts
            .raise(
                ctx,
                LogCategory::Job,
                Severity::Warning,
                "无效的任务类型",
                message,
                to_metadata(json!({ "job": job })),
            )
            .await;
        TriggerResponse::failure(&ctx.correlation_id, message)
    }

    async fn run_job(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        handler: &dyn JobHandler,
        options: &JobOptions,
        full_sync: bool,
    ) -> TriggerResponse {
        let payload = match handler.payload(options, None).and_then(|p| p.to_value()) {
            Ok(payload) => payload,
            Err(e) => {
                let message = format!("任务参数无效: {}", e);
                self.state
                    .update_status(ctx, job_type, JobStatus::Failed, Some(&message))
                    .await;
                self.alerts
                    .raise(
                        ctx,
                        LogCategory::Job,
                        Severity::Error,
                        "任务参数无效",
                        &message,
                        to_metadata(json!({ "jobType": job_type.as_str() })),
                    )
                    .await;
                return TriggerResponse {
                    job_id: Some(ctx.job_id.clone()),
                    ..TriggerResponse::failure(&ctx.correlation_id, message)
                };
            }
        };

        self.state
            .record_status(
                ctx,
                job_type,
                JobStatus::Running,
                StatusUpdate::default().with_payload(payload.clone()),
            )
            .await;
        self.logger
            .log_job_event(
                ctx,
                Severity::Info,
                "job_started",
                &format!("开始执行任务 {}", job_type),
                to_metadata(json!({ "jobType": job_type.as_str(), "payload": payload })),
            )
            .await;

        let job_ctx = JobContext::new(ctx.clone(), Arc::clone(&self.logger));
        let threshold = self.jobs_config.duration_threshold(job_type);
        let (outcome, elapsed) = self
            .monitor
            .measure(ctx, job_type, threshold, handler.execute(&job_ctx, options))
            .await;
        let duration_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(output) => {
                self.complete(ctx, job_type, handler, options, output, full_sync, duration_ms)
                    .await
            }
            Err(failure) => self.fail(ctx, job_type, failure, duration_ms).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        handler: &dyn JobHandler,
        options: &JobOptions,
        output: JobOutput,
        full_sync: bool,
        duration_ms: u64,
    ) -> TriggerResponse {
        let result = match output.to_value() {
            Ok(result) => result,
            Err(e) => {
                warn!(job.id = %ctx.job_id, "任务结果序列化失败，记录空结果: {}", e);
                Value::Null
            }
        };
        self.state
            .record_status(
                ctx,
                job_type,
                JobStatus::Completed,
                StatusUpdate::default().with_result(result.clone()),
            )
            .await;
        metrics::counter!(
            "enricher_job_runs_total",
            "job_type" => job_type.as_str().to_string(),
            "outcome" => "completed"
        )
        .increment(1);

        self.logger
            .log_job_event(
                ctx,
                Severity::Info,
                "job_completed",
                &format!("任务 {} 执行完成", job_type),
                to_metadata(json!({ "result": result, "durationMs": duration_ms })),
            )
            .await;
        info!(job.id = %ctx.job_id, duration_ms, "任务执行完成");

        let mut response = TriggerResponse::completed(ctx, job_type, &output);

        if output.has_more_data() && full_sync {
            if let Some(cursor) = output.last_cursor() {
                response.follow_up_job_id = self
                    .schedule_follow_up(ctx, job_type, handler, options, cursor)
                    .await;
            }
        }

        response
    }

    async fn schedule_follow_up(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        handler: &dyn JobHandler,
        options: &JobOptions,
        cursor: &CursorPair,
    ) -> Option<String> {
        let follow_up = ctx.follow_up(Uuid::new_v4().to_string());
        let scheduled = match handler.payload(options, Some(cursor)) {
            Ok(payload) => {
                let payload: JobPayload = payload.with_parent(&ctx.job_id);
                self.state
                    .schedule_follow_up(&follow_up, job_type, &payload)
                    .await
            }
            Err(e) => Err(e),
        };

        match scheduled {
            Ok(record) => {
                self.logger
                    .log_job_event(
                        &follow_up,
                        Severity::Info,
                        "follow_up_scheduled",
                        "剩余数据已排入续跑任务",
                        to_metadata(json!({
                            "parentJobId": ctx.job_id,
                            "productCursor": cursor.product_cursor,
                            "orderCursor": cursor.order_cursor,
                        })),
                    )
                    .await;
                Some(record.id)
            }
            Err(e) => {
                warn!(job.id = %ctx.job_id, "续跑任务创建失败: {}", e);
                self.alerts
                    .raise(
                        ctx,
                        LogCategory::System,
                        Severity::Warning,
                        "续跑任务创建失败",
                        &e.to_string(),
                        to_metadata(json!({
                            "productCursor": cursor.product_cursor,
                            "orderCursor": cursor.order_cursor,
                        })),
                    )
                    .await;
                None
            }
        }
    }

    async fn fail(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        failure: JobFailure,
        duration_ms: u64,
    ) -> TriggerResponse {
        let message = failure.to_string();
        let details = failure.to_value();
        error!(job.id = %ctx.job_id, error.signature = failure.error.signature(), "任务执行失败: {}", message);

        self.state
            .record_status(
                ctx,
                job_type,
                JobStatus::Failed,
                StatusUpdate::message(message.clone()).with_result(details.clone()),
            )
            .await;
        metrics::counter!(
            "enricher_job_runs_total",
            "job_type" => job_type.as_str().to_string(),
            "outcome" => "failed"
        )
        .increment(1);

        self.logger
            .log_job_event(
                ctx,
                Severity::Error,
                "job_failed",
                &message,
                to_metadata(json!({ "failure": details, "durationMs": duration_ms })),
            )
            .await;
        self.alerts
            .raise(
                ctx,
                LogCategory::Job,
                Severity::Error,
                "任务执行失败",
                &message,
                to_metadata(json!({
                    "jobType": job_type.as_str(),
                    "errorType": failure.error.signature(),
                    "checkpoint": failure.checkpoint,
                })),
            )
            .await;

        let partial = failure.partial.as_ref();
        TriggerResponse {
            job_id: Some(ctx.job_id.clone()),
            processed_count: partial.and_then(JobOutput::processed_count),
            updated_count: partial.and_then(JobOutput::updated_count),
            batches_processed: partial.and_then(JobOutput::batches_processed),
            ..TriggerResponse::failure(&ctx.correlation_id, format!("任务执行失败: {}", message))
        }
    }
}
