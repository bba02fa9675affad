use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub total_inventory: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// 单个商品在分析窗口内的销售指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMetrics {
    pub product_id: String,
    pub units_sold: i64,
    pub order_count: u32,
    /// 日均销量
    pub daily_velocity: f64,
    /// 按当前速度可售天数，没有销量时为空
    pub days_of_inventory: Option<f64>,
}

pub type MetricsMap = HashMap<String, ProductMetrics>;

/// 平台返回的一页数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            end_cursor: None,
            has_next_page: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 根据一批商品和窗口内的订单计算销售指标
///
/// 订单中不属于 `products` 的行项目会被忽略。
pub fn compute_metrics(products: &[Product], orders: &[Order], window_days: u32) -> MetricsMap {
    let window = f64::from(window_days.max(1));
    let wanted: HashSet<&str> = products.iter().map(|p| p.id.as_str()).collect();

    let mut units: HashMap<&str, i64> = HashMap::new();
    let mut order_counts: HashMap<&str, u32> = HashMap::new();

    for order in orders {
        let mut seen_in_order: HashSet<&str> = HashSet::new();
        for item in &order.line_items {
            let Some(product_id) = item.product_id.as_deref() else {
                continue;
            };
            if !wanted.contains(product_id) {
                continue;
            }
            *units.entry(product_id).or_insert(0) += item.quantity.max(0);
            if seen_in_order.insert(product_id) {
                *order_counts.entry(product_id).or_insert(0) += 1;
            }
        }
    }

    products
        .iter()
        .map(|product| {
            let units_sold = units.get(product.id.as_str()).copied().unwrap_or(0);
            let daily_velocity = units_sold as f64 / window;
            let days_of_inventory = if daily_velocity > 0.0 {
                Some(product.total_inventory.max(0) as f64 / daily_velocity)
            } else {
                None
            };
            let metrics = ProductMetrics {
                product_id: product.id.clone(),
                units_sold,
                order_count: order_counts.get(product.id.as_str()).copied().unwrap_or(0),
                daily_velocity,
                days_of_inventory,
            };
            (product.id.clone(), metrics)
        })
        .collect()
}
