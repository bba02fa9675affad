use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{JobDefaults, JobType};

/// 默认打标规则的阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagRulesConfig {
    /// 库存不超过该数量视为低库存
    pub low_stock_units: i64,
    /// 可售天数低于该值视为低库存
    pub low_stock_days: f64,
    /// 日均销量达到该值视为畅销
    pub best_seller_daily_velocity: f64,
    /// 可售天数超过该值视为滞销
    pub slow_mover_days: f64,
}

impl Default for TagRulesConfig {
    fn default() -> Self {
        Self {
            low_stock_units: 5,
            low_stock_days: 14.0,
            best_seller_daily_velocity: 1.0,
            slow_mover_days: 120.0,
        }
    }
}

/// Job execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub default_limit: u32,
    pub default_since_days: u32,
    pub default_max_products: u32,
    pub inter_batch_delay_ms: u64,
    /// 执行时间超过阈值时发出警告告警，按任务类型配置（毫秒）
    pub duration_thresholds_ms: HashMap<String, u64>,
    pub default_duration_threshold_ms: u64,
    pub tag_rules: TagRulesConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        let defaults = JobDefaults::default();
        let mut thresholds = HashMap::new();
        thresholds.insert(JobType::AutoTagProducts.to_string(), 60_000);
        thresholds.insert(JobType::InventoryAnalysis.to_string(), 30_000);

        Self {
            default_limit: defaults.limit,
            default_since_days: defaults.since_days,
            default_max_products: defaults.max_products,
            inter_batch_delay_ms: defaults.inter_batch_delay_ms,
            duration_thresholds_ms: thresholds,
            default_duration_threshold_ms: 60_000,
            tag_rules: TagRulesConfig::default(),
        }
    }
}

impl JobsConfig {
    pub fn defaults(&self) -> JobDefaults {
        JobDefaults {
            limit: self.default_limit,
            since_days: self.default_since_days,
            max_products: self.default_max_products,
            inter_batch_delay_ms: self.inter_batch_delay_ms,
        }
    }

    pub fn duration_threshold(&self, job_type: &JobType) -> Duration {
        let ms = self
            .duration_thresholds_ms
            .get(job_type.as_str())
            .copied()
            .unwrap_or(self.default_duration_threshold_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_limit == 0 {
            return Err(anyhow::anyhow!("默认分页大小必须大于0"));
        }

        if self.default_max_products == 0 {
            return Err(anyhow::anyhow!("单次运行最大商品数必须大于0"));
        }

        if self.default_duration_threshold_ms == 0 {
            return Err(anyhow::anyhow!("执行时间阈值必须大于0"));
        }

        Ok(())
    }
}
