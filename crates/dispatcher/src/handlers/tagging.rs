use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use enricher_core::config::TagRulesConfig;
use enricher_core::models::{
    CursorPair, JobOptions, JobPayload, JobType, MetricsMap, Product, ProductMetrics,
};
use enricher_core::retry::{with_retry, RetryConfig, RetryPolicy};
use enricher_errors::EnricherResult;
use enricher_infrastructure::cache::{CacheLayer, CacheNamespace};
use enricher_infrastructure::CatalogGateway;

use super::fetcher::CatalogPageFetcher;
use super::{JobContext, JobFailure, JobHandler, JobOutput};
use crate::pagination::{BatchOutcome, BatchPaginationEngine, BatchProcessor, PaginationOptions};

/// 根据商品和销售指标生成标签
pub trait TagAnalyzer: Send + Sync {
    fn analyze(&self, product: &Product, metrics: Option<&ProductMetrics>) -> Vec<String>;
}

pub const TAG_OUT_OF_STOCK: &str = "out-of-stock";
pub const TAG_LOW_STOCK: &str = "low-stock";
pub const TAG_BEST_SELLER: &str = "best-seller";
pub const TAG_SLOW_MOVER: &str = "slow-mover";

/// 默认规则：缺货、低库存、畅销、滞销
#[derive(Debug, Clone, Default)]
pub struct RuleBasedTagAnalyzer {
    rules: TagRulesConfig,
}

impl RuleBasedTagAnalyzer {
    pub fn new(rules: TagRulesConfig) -> Self {
        Self { rules }
    }
}

impl TagAnalyzer for RuleBasedTagAnalyzer {
    fn analyze(&self, product: &Product, metrics: Option<&ProductMetrics>) -> Vec<String> {
        let mut tags = Vec::new();
        let velocity = metrics.map(|m| m.daily_velocity).unwrap_or(0.0);
        let days_left = metrics.and_then(|m| m.days_of_inventory);

        if product.total_inventory <= 0 {
            tags.push(TAG_OUT_OF_STOCK.to_string());
        } else if product.total_inventory <= self.rules.low_stock_units
            || days_left.is_some_and(|days| days <= self.rules.low_stock_days)
        {
            tags.push(TAG_LOW_STOCK.to_string());
        }

        if velocity >= self.rules.best_seller_daily_velocity {
            tags.push(TAG_BEST_SELLER.to_string());
        }

        if product.total_inventory > 0 {
            let established = product
                .created_at
                .map(|created| Utc::now() - created > Duration::days(30))
                .unwrap_or(true);
            let slow = match days_left {
                Some(days) => days >= self.rules.slow_mover_days,
                None => established,
            };
            if slow {
                tags.push(TAG_SLOW_MOVER.to_string());
            }
        }

        tags
    }
}

/// 对一批商品打标，只写入商品上还没有的标签
pub struct TaggingProcessor {
    gateway: CatalogGateway,
    cache: CacheLayer,
    analyzer: Arc<dyn TagAnalyzer>,
    retry: RetryConfig,
    priority_ids: Vec<String>,
}

impl TaggingProcessor {
    pub fn new(
        gateway: CatalogGateway,
        cache: CacheLayer,
        analyzer: Arc<dyn TagAnalyzer>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            gateway,
            cache,
            analyzer,
            retry,
            priority_ids: Vec::new(),
        }
    }

    /// 优先处理的商品在批次内排在最前面
    pub fn with_priority(mut self, priority_ids: Vec<String>) -> Self {
        self.priority_ids = priority_ids;
        self
    }

    fn ordered<'a>(&self, items: &'a [Product]) -> Vec<&'a Product> {
        let mut ordered: Vec<&Product> = items.iter().collect();
        if !self.priority_ids.is_empty() {
            ordered.sort_by_key(|p| !self.priority_ids.contains(&p.id));
        }
        ordered
    }

    async fn invalidate(&self) {
        for namespace in [CacheNamespace::Products, CacheNamespace::Metrics] {
            if let Err(e) = self.cache.delete_cache_pattern(&namespace.pattern()).await {
                warn!("缓存失效失败 {}: {}", namespace.pattern(), e);
            }
        }
    }
}

#[async_trait]
impl BatchProcessor for TaggingProcessor {
    async fn process_batch(
        &self,
        items: &[Product],
        metrics: &MetricsMap,
    ) -> EnricherResult<BatchOutcome> {
        let policy = RetryPolicy::new(self.retry.clone()).on_retry(|error, attempt, delay| {
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "写入标签失败，准备重试: {}",
                error
            );
        });

        let mut outcome = BatchOutcome::default();
        let mut result: EnricherResult<()> = Ok(());

        for product in self.ordered(items) {
            outcome.processed_count += 1;

            let mut missing: Vec<String> = Vec::new();
            for tag in self.analyzer.analyze(product, metrics.get(&product.id)) {
                if !product.has_tag(&tag) && !missing.contains(&tag) {
                    missing.push(tag);
                }
            }
            if missing.is_empty() {
                continue;
            }

            let tags = missing.as_slice();
            if let Err(e) = with_retry(|| self.gateway.add_tags(&product.id, tags), &policy).await {
                result = Err(e);
                break;
            }
            debug!(product.id = %product.id, tags = ?missing, "已写入标签");
            outcome.updated_count += 1;
        }

        // 部分写入也可能让缓存过期
        if outcome.updated_count > 0 {
            self.invalidate().await;
        }

        result.map(|()| outcome)
    }
}

/// 自动打标任务：分页引擎加打标处理器
pub struct TaggingHandler {
    gateway: CatalogGateway,
    cache: CacheLayer,
    analyzer: Arc<dyn TagAnalyzer>,
    retry: RetryConfig,
    engine: BatchPaginationEngine,
}

impl TaggingHandler {
    pub fn new(
        gateway: CatalogGateway,
        cache: CacheLayer,
        analyzer: Arc<dyn TagAnalyzer>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            gateway,
            cache,
            analyzer,
            retry,
            engine: BatchPaginationEngine::new(),
        }
    }
}

#[async_trait]
impl JobHandler for TaggingHandler {
    fn job_type(&self) -> JobType {
        JobType::AutoTagProducts
    }

    fn payload(
        &self,
        options: &JobOptions,
        resume_from: Option<&CursorPair>,
    ) -> EnricherResult<JobPayload> {
        let resolved = options.tagging()?;
        let resolved = match resume_from {
            Some(cursors) => resolved.continue_from(cursors),
            None => resolved,
        };
        JobPayload::new(self.job_type(), &resolved)
    }

    async fn execute(&self, ctx: &JobContext, options: &JobOptions) -> Result<JobOutput, JobFailure> {
        let options = options.tagging()?;
        info!(
            job.id = ctx.job_id(),
            limit = options.limit,
            full_sync = options.full_sync,
            max_products = options.max_products,
            "开始自动打标"
        );

        let fetcher =
            CatalogPageFetcher::new(self.gateway.clone(), self.cache.clone(), options.since_days);
        let processor = TaggingProcessor::new(
            self.gateway.clone(),
            self.cache.clone(),
            Arc::clone(&self.analyzer),
            self.retry.clone(),
        )
        .with_priority(options.priority_product_ids.clone());

        match self
            .engine
            .run(
                &ctx.correlation,
                options.cursors(),
                &fetcher,
                &processor,
                &PaginationOptions::from(&options),
            )
            .await
        {
            Ok(outcome) => Ok(JobOutput::Tagging(outcome.into_tagging_result())),
            Err(failure) => Err(JobFailure {
                error: failure.error,
                checkpoint: Some(failure.checkpoint),
                partial: Some(JobOutput::Tagging(failure.partial.into_tagging_result())),
            }),
        }
    }
}
