//! 批量分页引擎
//!
//! 逐页拉取商品（及其关联订单指标），每页成功处理后才推进游标。
//! 单次调用的运行时间由 `max_items` 和单页模式约束，剩余数据交给续跑任务。

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use enricher_core::models::{
    CorrelationContext, CursorPair, MetricsMap, Product, TaggingOptions, TaggingResult,
};
use enricher_errors::{EnricherError, EnricherResult};

/// 一次拉取的结果：本页商品、指标以及下一位置
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPage {
    pub items: Vec<Product>,
    pub metrics: MetricsMap,
    pub next: CursorPair,
}

impl BatchPage {
    pub fn has_more(&self) -> bool {
        self.next.has_more()
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, cursors: &CursorPair, limit: u32) -> EnricherResult<BatchPage>;
}

/// 单批处理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed_count: u64,
    pub updated_count: u64,
}

#[async_trait]
pub trait BatchProcessor: Send + Sync {
    async fn process_batch(&self, items: &[Product], metrics: &MetricsMap)
        -> EnricherResult<BatchOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOptions {
    /// 为 false 时只处理一页
    pub full_sync: bool,
    /// 所有页面合计的商品上限
    pub max_items: u32,
    pub limit: u32,
    pub inter_batch_delay: Duration,
}

impl From<&TaggingOptions> for PaginationOptions {
    fn from(options: &TaggingOptions) -> Self {
        Self {
            full_sync: options.full_sync,
            max_items: options.max_products,
            limit: options.limit,
            inter_batch_delay: Duration::from_millis(options.inter_batch_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOutcome {
    pub processed: u64,
    pub updated: u64,
    pub batches_processed: u32,
    pub items_fetched: u32,
    pub has_more_data: bool,
    /// 最后一个成功处理的检查点
    pub last_cursor: CursorPair,
}

impl PaginationOutcome {
    fn starting_at(cursors: &CursorPair) -> Self {
        Self {
            processed: 0,
            updated: 0,
            batches_processed: 0,
            items_fetched: 0,
            has_more_data: cursors.has_more(),
            last_cursor: cursors.clone(),
        }
    }

    pub fn into_tagging_result(self) -> TaggingResult {
        TaggingResult {
            processed_count: self.processed,
            updated_count: self.updated,
            batches_processed: self.batches_processed,
            has_more_data: self.has_more_data,
            last_cursor: Some(self.last_cursor),
        }
    }
}

/// 分页中途失败：携带原始错误和最后成功的检查点
#[derive(Debug)]
pub struct PaginationFailure {
    pub error: EnricherError,
    pub checkpoint: CursorPair,
    pub partial: PaginationOutcome,
}

impl fmt::Display for PaginationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (已完成 {} 批)",
            self.error, self.partial.batches_processed
        )
    }
}

impl std::error::Error for PaginationFailure {}

#[derive(Debug, Clone, Default)]
pub struct BatchPaginationEngine;

impl BatchPaginationEngine {
    pub fn new() -> Self {
        Self
    }

    /// 从 `start` 开始逐页拉取并处理
    ///
    /// 拉取或处理失败时游标停留在上一个成功页面，失败页不计入结果。
    pub async fn run(
        &self,
        ctx: &CorrelationContext,
        start: CursorPair,
        fetcher: &dyn PageFetcher,
        processor: &dyn BatchProcessor,
        options: &PaginationOptions,
    ) -> Result<PaginationOutcome, PaginationFailure> {
        let mut cursors = start;
        let mut outcome = PaginationOutcome::starting_at(&cursors);
        let limit = options.limit.max(1);

        while cursors.has_more() && outcome.items_fetched < options.max_items {
            let page_size = limit.min(options.max_items - outcome.items_fetched);
            debug!(
                correlation_id = %ctx.correlation_id,
                batch = outcome.batches_processed + 1,
                page_size,
                product_cursor = cursors.product_cursor.as_deref().unwrap_or("start"),
                "拉取下一页"
            );

            let page = match fetcher.fetch_page(&cursors, page_size).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(correlation_id = %ctx.correlation_id, "页面拉取失败: {}", error);
                    return Err(Self::failure(error, &cursors, outcome));
                }
            };

            if page.items.is_empty() {
                debug!(correlation_id = %ctx.correlation_id, "空页，结束分页");
                cursors.advance_to(&page.next);
                cursors.has_more_products = false;
                outcome.has_more_data = false;
                outcome.last_cursor = cursors;
                return Ok(outcome);
            }

            let batch = match processor.process_batch(&page.items, &page.metrics).await {
                Ok(batch) => batch,
                Err(error) => {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        batch = outcome.batches_processed + 1,
                        "批次处理失败，游标保持在上一检查点: {}",
                        error
                    );
                    return Err(Self::failure(error, &cursors, outcome));
                }
            };

            cursors.advance_to(&page.next);
            outcome.items_fetched += page.items.len() as u32;
            outcome.processed += batch.processed_count;
            outcome.updated += batch.updated_count;
            outcome.batches_processed += 1;
            outcome.last_cursor = cursors.clone();

            info!(
                correlation_id = %ctx.correlation_id,
                batch = outcome.batches_processed,
                processed = batch.processed_count,
                updated = batch.updated_count,
                has_more = cursors.has_more(),
                "批次处理完成"
            );

            if !options.full_sync {
                break;
            }

            if cursors.has_more()
                && outcome.items_fetched < options.max_items
                && !options.inter_batch_delay.is_zero()
            {
                tokio::time::sleep(options.inter_batch_delay).await;
            }
        }

        outcome.has_more_data = cursors.has_more();
        outcome.last_cursor = cursors;
        Ok(outcome)
    }

    fn failure(
        error: EnricherError,
        checkpoint: &CursorPair,
        mut partial: PaginationOutcome,
    ) -> PaginationFailure {
        partial.has_more_data = checkpoint.has_more();
        partial.last_cursor = checkpoint.clone();
        PaginationFailure {
            error,
            checkpoint: checkpoint.clone(),
            partial,
        }
    }
}
