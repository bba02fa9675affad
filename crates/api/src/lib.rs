//! # Enricher API
//!
//! 任务编排服务的 HTTP 接口，基于 Axum 构建。
//!
//! ## API 端点
//!
//! - `POST /api/cron` - 触发任务（表单参数，`x-api-key` 或可信 IP 认证）
//! - `GET /api/cron` - 存活探针
//! - `GET /health` - 健康检查
//! - `GET /api/runs/{request_id}` - 按 requestId 查询任务记录、日志和告警
//! - `GET /api/alerts?limit=N` - 最近的告警
//! - `GET /metrics` - Prometheus 指标
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/cron \
//!   -H "x-api-key: $CRON_KEY" \
//!   -d job=auto-tag-products -d limit=50 -d fullSync=true
//! ```
//!
//! 已认证的触发请求总是返回 200，任务失败通过响应体中的 `success: false` 表达；
//! 认证失败返回 401。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use enricher_core::config::ServerConfig;
use middleware::{cors_layer, request_logging, trace_layer};

pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, server: &ServerConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if server.cors_enabled {
        router.layer(cors_layer(server))
    } else {
        router
    }
}
