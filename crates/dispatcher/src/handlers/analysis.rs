use async_trait::async_trait;
use tracing::info;

use enricher_core::config::TagRulesConfig;
use enricher_core::models::{
    AnalysisOptions, AnalysisResult, CursorPair, JobOptions, JobPayload, JobType, MetricsMap,
    Order, Product,
};
use enricher_errors::EnricherResult;
use enricher_infrastructure::cache::{analysis_status_key, CacheLayer};
use enricher_infrastructure::CatalogGateway;

use super::fetcher::CatalogPageFetcher;
use super::tagging::{RuleBasedTagAnalyzer, TagAnalyzer, TAG_LOW_STOCK};
use super::{JobContext, JobFailure, JobHandler, JobOutput};

const TOP_SELLERS: usize = 5;

/// 库存分析任务：单页商品加订单，汇总缺货、低库存和畅销商品
pub struct InventoryAnalysisHandler {
    gateway: CatalogGateway,
    cache: CacheLayer,
    analyzer: RuleBasedTagAnalyzer,
}

impl InventoryAnalysisHandler {
    pub fn new(gateway: CatalogGateway, cache: CacheLayer, rules: TagRulesConfig) -> Self {
        Self {
            gateway,
            cache,
            analyzer: RuleBasedTagAnalyzer::new(rules),
        }
    }

    async fn analyze(&self, options: &AnalysisOptions) -> EnricherResult<AnalysisResult> {
        let fetcher =
            CatalogPageFetcher::new(self.gateway.clone(), self.cache.clone(), options.since_days);
        let products = fetcher
            .products_page(options.limit, options.product_cursor.as_deref())
            .await?;
        let orders = fetcher
            .order_window(options.order_cursor.as_deref())
            .await?;
        let metrics = fetcher.metrics_for(&products.items, orders).await?;

        let mut result = self.summarize(&products.items, orders, &metrics);
        result.window_days = fetcher.window_days();
        result.has_more_data = products.has_next_page;
        Ok(result)
    }

    fn summarize(&self, products: &[Product], orders: &[Order], metrics: &MetricsMap) -> AnalysisResult {
        let mut result = AnalysisResult {
            products_analyzed: products.len() as u64,
            orders_analyzed: orders.len() as u64,
            ..Default::default()
        };

        for product in products {
            let product_metrics = metrics.get(&product.id);
            if product.total_inventory <= 0 {
                result.out_of_stock.push(product.id.clone());
            } else if self
                .analyzer
                .analyze(product, product_metrics)
                .iter()
                .any(|tag| tag == TAG_LOW_STOCK)
            {
                result.low_stock.push(product.id.clone());
            }
        }

        let mut sellers: Vec<(&String, i64)> = metrics
            .values()
            .filter(|m| m.units_sold > 0)
            .map(|m| (&m.product_id, m.units_sold))
            .collect();
        sellers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        result.top_sellers = sellers
            .iter()
            .take(TOP_SELLERS)
            .map(|(id, _)| (*id).clone())
            .collect();
        result.total_units_sold = metrics.values().map(|m| m.units_sold).sum();

        result
    }
}

#[async_trait]
impl JobHandler for InventoryAnalysisHandler {
    fn job_type(&self) -> JobType {
        JobType::InventoryAnalysis
    }

    fn payload(
        &self,
        options: &JobOptions,
        _resume_from: Option<&CursorPair>,
    ) -> EnricherResult<JobPayload> {
        JobPayload::new(self.job_type(), &options.analysis()?)
    }

    async fn execute(&self, ctx: &JobContext, options: &JobOptions) -> Result<JobOutput, JobFailure> {
        let options = options.analysis()?;
        info!(job.id = ctx.job_id(), limit = options.limit, "开始库存分析");

        // 带游标的分析是翻页查看，不写入店铺状态缓存
        let result = if options.product_cursor.is_none() && options.order_cursor.is_none() {
            let key = analysis_status_key(&ctx.correlation.shop, options.limit, options.since_days);
            self.cache
                .get_or_fetch(&key, self.cache.ttl().system_status(), || self.analyze(&options))
                .await?
        } else {
            self.analyze(&options).await?
        };

        info!(
            job.id = ctx.job_id(),
            products = result.products_analyzed,
            out_of_stock = result.out_of_stock.len(),
            low_stock = result.low_stock.len(),
            "库存分析完成"
        );
        Ok(JobOutput::Analysis(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enricher_core::models::{CorrelationContext, TriggerParams};
    use enricher_infrastructure::cache::{CachePolicy, CacheTtlConfig, InMemoryCacheStore};
    use enricher_infrastructure::database::InMemoryLogStore;
    use enricher_observability::EventLogger;
    use enricher_testing_utils::{
        test_job_defaults, CallKind, MockCommerceClient, OrderBuilder, ProductBuilder,
    };
    use std::sync::Arc;

    fn handler(client: &MockCommerceClient, cache: CacheLayer) -> InventoryAnalysisHandler {
        InventoryAnalysisHandler::new(
            CatalogGateway::new(Arc::new(client.clone())),
            cache,
            TagRulesConfig::default(),
        )
    }

    fn context() -> JobContext {
        JobContext::new(
            CorrelationContext::new("demo.myshopify.com"),
            Arc::new(EventLogger::new(Arc::new(InMemoryLogStore::new()))),
        )
    }

    fn options() -> JobOptions {
        JobOptions::new(TriggerParams::for_job("inventory-analysis"), test_job_defaults())
    }

    fn catalog() -> MockCommerceClient {
        MockCommerceClient::new()
            .with_products(vec![
                ProductBuilder::new("p1").with_inventory(0).build(),
                ProductBuilder::new("p2").with_inventory(3).build(),
                ProductBuilder::new("p3").with_inventory(400).build(),
                ProductBuilder::new("p4").with_inventory(400).build(),
            ])
            .with_orders(vec![
                OrderBuilder::new("o1").with_line_item("p3", 40).build(),
                OrderBuilder::new("o2")
                    .with_line_item("p4", 10)
                    .with_line_item("p2", 2)
                    .build(),
            ])
    }

    #[tokio::test]
    async fn test_analysis_summarizes_inventory() {
        let client = catalog();

        let output = handler(&client, CacheLayer::disabled())
            .execute(&context(), &options())
            .await
            .unwrap();

        let JobOutput::Analysis(result) = output else {
            panic!("expected analysis output");
        };
        assert_eq!(result.products_analyzed, 4);
        assert_eq!(result.orders_analyzed, 2);
        assert_eq!(result.window_days, 30);
        assert_eq!(result.out_of_stock, vec!["p1".to_string()]);
        assert_eq!(result.low_stock, vec!["p2".to_string()]);
        assert_eq!(
            result.top_sellers,
            vec!["p3".to_string(), "p4".to_string(), "p2".to_string()]
        );
        assert_eq!(result.total_units_sold, 52);
        assert!(!result.has_more_data);
    }

    #[tokio::test]
    async fn test_repeat_analysis_is_served_from_cache() {
        let client = catalog();
        let cache = CacheLayer::new(
            Arc::new(InMemoryCacheStore::new()),
            CachePolicy::fail_open(),
            CacheTtlConfig::default(),
        );
        let handler = handler(&client, cache);

        let first = handler.execute(&context(), &options()).await.unwrap();
        let second = handler.execute(&context(), &options()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.call_count(CallKind::Products), 1);
    }

    #[tokio::test]
    async fn test_cached_summary_is_scoped_to_limit_and_window() {
        let client = catalog().paginated();
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = CacheLayer::new(store.clone(), CachePolicy::fail_open(), CacheTtlConfig::default());
        let handler = handler(&client, cache);

        handler.execute(&context(), &options()).await.unwrap();
        let mut narrow = TriggerParams::for_job("inventory-analysis");
        narrow.limit = Some("2".to_string());
        let output = handler
            .execute(&context(), &JobOptions::new(narrow, test_job_defaults()))
            .await
            .unwrap();

        let JobOutput::Analysis(result) = output else {
            panic!("expected analysis output");
        };
        assert_eq!(result.products_analyzed, 2);
        assert!(result.has_more_data);
        assert_eq!(client.call_count(CallKind::Products), 2);

        let mut keys: Vec<String> = store
            .keys()
            .await
            .into_iter()
            .filter(|k| k.starts_with("system-status:"))
            .collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "system-status:demo.myshopify.com:2:30".to_string(),
                "system-status:demo.myshopify.com:50:30".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_analysis_merges_every_order_page() {
        let orders = (0..300)
            .map(|i| OrderBuilder::new(&format!("o{i}")).with_line_item("p3", 1).build())
            .collect();
        let client = catalog().with_orders(orders).paginated();

        let output = handler(&client, CacheLayer::disabled())
            .execute(&context(), &options())
            .await
            .unwrap();

        let JobOutput::Analysis(result) = output else {
            panic!("expected analysis output");
        };
        assert_eq!(result.orders_analyzed, 300);
        assert_eq!(result.total_units_sold, 300);
        assert_eq!(client.call_count(CallKind::Orders), 2);
    }

    #[tokio::test]
    async fn test_platform_failure_is_reported() {
        let client = catalog().fail_products_call(1);

        let failure = handler(&client, CacheLayer::disabled())
            .execute(&context(), &options())
            .await
            .unwrap_err();

        assert!(failure.checkpoint.is_none());
        assert!(failure.to_string().contains("products query #1 rejected"));
    }

    #[test]
    fn test_payload_records_resolved_options() {
        let client = catalog();
        let payload = handler(&client, CacheLayer::disabled())
            .payload(&options(), None)
            .unwrap();

        assert_eq!(payload.job_type, JobType::InventoryAnalysis);
        assert_eq!(payload.options["limit"], serde_json::json!(50));
    }
}
