use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::SERVICE_NAME;
use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let stats = state.cache.stats().await;

    Json(json!({
        "service": SERVICE_NAME,
        "status": "available",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "jobTypes": state.dispatcher.registry().job_types(),
        "cache": {
            "enabled": state.cache.is_enabled(),
            "hitRate": stats.hit_rate(),
            "errorRate": stats.error_rate(),
            "stats": stats,
        },
    }))
}
