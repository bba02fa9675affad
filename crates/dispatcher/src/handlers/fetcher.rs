use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use enricher_core::models::{
    compute_metrics, CursorPair, MetricsMap, Order, Page, Product, MAX_PAGE_SIZE,
};
use enricher_errors::EnricherResult;
use enricher_infrastructure::cache::{metrics_key, orders_key, products_key, CacheLayer};
use enricher_infrastructure::CatalogGateway;

use crate::pagination::{BatchPage, PageFetcher};

/// 单次运行最多合并的订单页数
const MAX_ORDER_PAGES: usize = 100;

/// 通过读穿缓存拉取商品页、订单页并计算销售指标
///
/// 每次运行创建一个实例。订单窗口在第一页时被完整合并为运行级汇总，
/// 之后每个商品页的指标都基于同一份汇总计算。
pub struct CatalogPageFetcher {
    gateway: CatalogGateway,
    cache: CacheLayer,
    since: DateTime<Utc>,
    window_days: u32,
    orders: OnceCell<Vec<Order>>,
}

impl CatalogPageFetcher {
    pub fn new(gateway: CatalogGateway, cache: CacheLayer, since_days: u32) -> Self {
        Self {
            gateway,
            cache,
            since: Utc::now() - Duration::days(i64::from(since_days)),
            window_days: since_days,
            orders: OnceCell::new(),
        }
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    pub async fn products_page(&self, limit: u32, cursor: Option<&str>) -> EnricherResult<Page<Product>> {
        let key = products_key(limit, cursor);
        self.cache
            .get_or_fetch(&key, self.cache.ttl().products(), || {
                self.gateway.fetch_products(limit, cursor)
            })
            .await
    }

    pub async fn orders_page(&self, cursor: Option<&str>) -> EnricherResult<Page<Order>> {
        let since_date = self.since.format("%Y-%m-%d").to_string();
        let key = orders_key(&since_date, cursor);
        self.cache
            .get_or_fetch(&key, self.cache.ttl().orders(), || {
                self.gateway.fetch_orders(self.since, MAX_PAGE_SIZE, cursor)
            })
            .await
    }

    /// 从 `start` 开始合并整个订单窗口，同一实例只拉取一次
    pub async fn order_window(&self, start: Option<&str>) -> EnricherResult<&[Order]> {
        let orders = self
            .orders
            .get_or_try_init(|| self.drain_orders(start))
            .await?;
        Ok(orders.as_slice())
    }

    async fn drain_orders(&self, start: Option<&str>) -> EnricherResult<Vec<Order>> {
        let mut merged = Vec::new();
        let mut cursor = start.map(str::to_string);

        for page_number in 1..=MAX_ORDER_PAGES {
            let page = self.orders_page(cursor.as_deref()).await?;
            merged.extend(page.items);

            if !page.has_next_page || page.end_cursor.is_none() {
                debug!(pages = page_number, orders = merged.len(), "订单窗口合并完成");
                return Ok(merged);
            }
            cursor = page.end_cursor;
        }

        warn!(
            pages = MAX_ORDER_PAGES,
            orders = merged.len(),
            "订单页数达到上限，剩余订单不计入销售指标"
        );
        Ok(merged)
    }

    pub async fn metrics_for(&self, products: &[Product], orders: &[Order]) -> EnricherResult<MetricsMap> {
        let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
        let key = metrics_key(&ids, orders.len());
        let window_days = self.window_days;
        self.cache
            .get_or_fetch(&key, self.cache.ttl().metrics(), || async move {
                Ok(compute_metrics(products, orders, window_days))
            })
            .await
    }
}

#[async_trait]
impl PageFetcher for CatalogPageFetcher {
    async fn fetch_page(&self, cursors: &CursorPair, limit: u32) -> EnricherResult<BatchPage> {
        if !cursors.has_more_products {
            return Ok(BatchPage {
                items: Vec::new(),
                metrics: MetricsMap::new(),
                next: cursors.clone(),
            });
        }

        let products = self
            .products_page(limit, cursors.product_cursor.as_deref())
            .await?;
        let orders = self.order_window(cursors.order_cursor.as_deref()).await?;
        let metrics = self.metrics_for(&products.items, orders).await?;

        debug!(
            products = products.len(),
            orders = orders.len(),
            "已拉取商品页并关联订单汇总"
        );

        // 订单游标停留在窗口起点：汇总只存在于本次运行，续跑需要重新合并同一窗口
        let next = CursorPair {
            product_cursor: products.end_cursor.clone(),
            order_cursor: cursors.order_cursor.clone(),
            has_more_products: products.has_next_page,
            has_more_orders: false,
        };

        Ok(BatchPage {
            items: products.items,
            metrics,
            next,
        })
    }
}
