use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde_json::{json, Value};
use tracing::info;

use enricher_core::models::{LogCategory, TriggerParams};
use enricher_dispatcher::TriggerRequest;

use super::SERVICE_NAME;
use crate::auth::ClientIdentity;
use crate::routes::AppState;

/// 触发入口
///
/// 已认证的请求无论任务成败都返回 200，结果在响应体的 `success` 中；
/// 只有认证失败返回 401。请求体无法解析时同样先认证。
pub async fn trigger_cron(
    State(state): State<AppState>,
    identity: ClientIdentity,
    form: Result<Form<TriggerParams>, FormRejection>,
) -> Response {
    let credentials = identity.into_credentials();
    let response = match form {
        Ok(Form(params)) => {
            state
                .dispatcher
                .handle_trigger(TriggerRequest::cron(credentials, params))
                .await
        }
        Err(rejection) => {
            state
                .dispatcher
                .handle_malformed(LogCategory::Cron, credentials, &rejection.body_text())
                .await
        }
    };

    info!(
        request_id = %response.request_id,
        success = response.success,
        "触发请求处理完成"
    );

    if response.unauthorized {
        return (StatusCode::UNAUTHORIZED, Json(response)).into_response();
    }
    Json(response).into_response()
}

/// 存活探针
pub async fn cron_status() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "available",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
