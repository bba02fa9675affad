use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use enricher_core::models::{AlertRecord, JobRecord, LogRecord};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

/// 一次触发的完整审计记录
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTrail {
    pub request_id: String,
    pub job: Option<JobRecord>,
    pub logs: Vec<LogRecord>,
    pub alerts: Vec<AlertRecord>,
}

/// 按 requestId 查询日志、告警和任务记录
pub async fn get_run(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let dispatcher = &state.dispatcher;
    let logs = dispatcher.logger().timeline(&request_id).await?;
    let alerts = dispatcher.alerts().for_correlation(&request_id).await?;

    let job_id = logs
        .iter()
        .find_map(|record| record.job_id.clone())
        .unwrap_or_else(|| request_id.clone());
    let job = dispatcher.state().find(&job_id).await?;

    if logs.is_empty() && alerts.is_empty() && job.is_none() {
        return Err(ApiError::NotFound(format!("运行记录 {}", request_id)));
    }

    Ok(success(RunTrail {
        request_id,
        job,
        logs,
        alerts,
    }))
}
