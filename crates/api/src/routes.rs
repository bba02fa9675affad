use axum::{
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use enricher_core::config::AuthConfig;
use enricher_dispatcher::JobDispatcher;
use enricher_infrastructure::CacheLayer;

use crate::auth::require_api_key;
use crate::handlers::{
    alerts::list_alerts,
    cron::{cron_status, trigger_cron},
    health::health_check,
    metrics::render_metrics,
    runs::get_run,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<JobDispatcher>,
    pub auth: AuthConfig,
    /// 健康检查中报告命中率
    pub cache: CacheLayer,
    /// 为空时 `/metrics` 返回 404
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(dispatcher: Arc<JobDispatcher>, auth: AuthConfig) -> Self {
        Self {
            dispatcher,
            auth,
            cache: CacheLayer::disabled(),
            metrics: None,
        }
    }

    pub fn with_cache(mut self, cache: CacheLayer) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/runs/{request_id}", get(get_run))
        .route("/api/alerts", get(list_alerts))
        .route_layer(from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // 触发入口自行处理认证，失败时记录安全告警
        .route("/api/cron", get(cron_status).post(trigger_cron))
        .merge(protected)
        .with_state(state)
}
