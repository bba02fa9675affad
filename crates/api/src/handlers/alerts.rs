use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct AlertQueryParams {
    pub limit: Option<usize>,
}

/// 最近的告警，按时间倒序
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit 必须在 1 到 {} 之间",
            MAX_LIMIT
        )));
    }

    let alerts = state.dispatcher.alerts().recent(limit).await?;
    Ok(success(alerts))
}
