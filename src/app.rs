use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::{info, warn};

use enricher_api::{create_app, AppState};
use enricher_core::config::AppConfig;
use enricher_core::traits::CacheStore;
use enricher_dispatcher::{
    InventoryAnalysisHandler, JobDispatcher, JobRegistry, JobStateManager, RuleBasedTagAnalyzer,
    TaggingHandler,
};
use enricher_infrastructure::{
    CacheLayer, CatalogGateway, DatabaseManager, GraphqlCommerceClient, InMemoryCacheStore,
    RedisCacheStore, Stores,
};
use enricher_observability::{AlertManager, EventLogger};
use metrics_exporter_prometheus::PrometheusHandle;

/// 主应用程序，负责组装存储、缓存、平台客户端和调度器
pub struct Application {
    config: AppConfig,
    database: Option<DatabaseManager>,
    dispatcher: Arc<JobDispatcher>,
    cache: CacheLayer,
    metrics: Option<PrometheusHandle>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, metrics: Option<PrometheusHandle>) -> Result<Self> {
        info!("初始化应用程序，店铺: {}", config.platform.shop_domain);

        let (database, stores) = create_stores(&config).await?;
        let cache = create_cache(&config).await?;

        let client = GraphqlCommerceClient::new(&config.platform).context("创建电商平台客户端失败")?;
        let gateway = CatalogGateway::new(Arc::new(client));

        let logger = Arc::new(EventLogger::new(stores.logs));
        let alerts = Arc::new(
            AlertManager::from_config(logger, stores.alerts, &config.alerting)
                .context("创建告警管理器失败")?,
        );

        let registry = JobRegistry::new()
            .register(Arc::new(TaggingHandler::new(
                gateway.clone(),
                cache.clone(),
                Arc::new(RuleBasedTagAnalyzer::new(config.jobs.tag_rules.clone())),
                config.retry.clone(),
            )))
            .register(Arc::new(InventoryAnalysisHandler::new(
                gateway,
                cache.clone(),
                config.jobs.tag_rules.clone(),
            )));
        info!("已注册任务类型: {:?}", registry.job_types());

        let dispatcher = JobDispatcher::new(
            config.auth.clone(),
            config.platform.shop_domain.clone(),
            registry,
            JobStateManager::new(stores.jobs),
            alerts,
            config.jobs.clone(),
        );

        Ok(Self {
            config,
            database,
            dispatcher: Arc::new(dispatcher),
            cache,
            metrics,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }

    /// 构建HTTP路由
    pub fn router(&self) -> Router {
        let mut state = AppState::new(Arc::clone(&self.dispatcher), self.config.auth.clone())
            .with_cache(self.cache.clone());
        if let Some(handle) = &self.metrics {
            state = state.with_metrics(handle.clone());
        }
        create_app(state, &self.config.server)
    }

    /// 释放数据库连接
    pub async fn shutdown(&self) {
        if let Some(database) = &self.database {
            database.close().await;
            info!("数据库连接已关闭");
        }
    }
}

/// 创建任务、日志和告警存储
async fn create_stores(config: &AppConfig) -> Result<(Option<DatabaseManager>, Stores)> {
    if config.database.is_memory() {
        info!("使用进程内存储，重启后记录不保留");
        return Ok((None, Stores::in_memory()));
    }

    let database = DatabaseManager::from_config(&config.database)
        .await
        .with_context(|| format!("连接数据库失败: {}", config.database.url))?;
    let stores = database.stores();
    info!("数据库连接成功");
    Ok((Some(database), stores))
}

/// 创建缓存层，Redis不可用且允许降级时关闭缓存
async fn create_cache(config: &AppConfig) -> Result<CacheLayer> {
    let cache_config = &config.cache;
    if !cache_config.enabled {
        info!("缓存已禁用");
        return Ok(CacheLayer::disabled());
    }

    let store: Arc<dyn CacheStore> = if cache_config.is_memory() {
        Arc::new(InMemoryCacheStore::new())
    } else {
        match RedisCacheStore::connect(&cache_config.url, cache_config.key_prefix.clone()).await {
            Ok(store) => Arc::new(store),
            Err(e) if cache_config.fail_open => {
                warn!("连接Redis失败，缓存降级为禁用: {}", e);
                return Ok(CacheLayer::disabled());
            }
            Err(e) => return Err(e).context("连接Redis失败"),
        }
    };

    Ok(CacheLayer::from_config(store, cache_config))
}
