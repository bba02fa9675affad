use serde::{Deserialize, Serialize};

/// 两个独立分页集合（商品与订单）的分页状态
///
/// 游标为平台返回的不透明字符串，`None` 表示从头开始。
/// 只有对应页面被成功合并处理后游标才会前进。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPair {
    pub product_cursor: Option<String>,
    pub order_cursor: Option<String>,
    pub has_more_products: bool,
    pub has_more_orders: bool,
}

impl Default for CursorPair {
    fn default() -> Self {
        Self::start()
    }
}

impl CursorPair {
    pub fn start() -> Self {
        Self {
            product_cursor: None,
            order_cursor: None,
            has_more_products: true,
            has_more_orders: true,
        }
    }

    /// 从外部传入的游标恢复（例如续跑任务的触发参数）
    pub fn resume(product_cursor: Option<String>, order_cursor: Option<String>) -> Self {
        Self {
            product_cursor,
            order_cursor,
            has_more_products: true,
            has_more_orders: true,
        }
    }

    pub fn exhausted() -> Self {
        Self {
            product_cursor: None,
            order_cursor: None,
            has_more_products: false,
            has_more_orders: false,
        }
    }

    pub fn has_more(&self) -> bool {
        self.has_more_products || self.has_more_orders
    }

    /// 在一页被成功处理后推进到下一位置
    ///
    /// 已经取尽的集合保留其最后一个有效游标。
    pub fn advance_to(&mut self, next: &CursorPair) {
        if next.product_cursor.is_some() {
            self.product_cursor = next.product_cursor.clone();
        }
        if next.order_cursor.is_some() {
            self.order_cursor = next.order_cursor.clone();
        }
        self.has_more_products = next.has_more_products;
        self.has_more_orders = next.has_more_orders;
    }

    pub fn is_start(&self) -> bool {
        self.product_cursor.is_none() && self.order_cursor.is_none()
    }
}
