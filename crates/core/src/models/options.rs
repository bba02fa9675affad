use serde::{Deserialize, Serialize};
use serde_json::Value;

use enricher_errors::{EnricherError, EnricherResult};

use super::cursor::CursorPair;
use super::job::JobType;

/// 平台单页最大条数
pub const MAX_PAGE_SIZE: u32 = 250;

/// 触发请求中的原始表单字段
///
/// 所有字段保持字符串形式，由各任务类型自行解析为结构化选项。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParams {
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub since_days: Option<String>,
    #[serde(default)]
    pub full_sync: Option<String>,
    #[serde(default)]
    pub max_products: Option<String>,
    #[serde(default)]
    pub product_cursor: Option<String>,
    #[serde(default)]
    pub order_cursor: Option<String>,
    #[serde(default)]
    pub priority_product_ids: Option<String>,
}

impl TriggerParams {
    pub fn for_job(job: impl Into<String>) -> Self {
        Self {
            job: Some(job.into()),
            ..Default::default()
        }
    }

    pub fn job_type(&self) -> Option<JobType> {
        non_empty(&self.job).map(|name| JobType::from(name.to_string()))
    }

    pub fn requested_job_id(&self) -> Option<&str> {
        non_empty(&self.job_id)
    }

    /// 只有字面量 `"true"`（忽略大小写）或 `"1"` 视为开启
    pub fn is_full_sync(&self) -> bool {
        non_empty(&self.full_sync)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn cursors(&self) -> CursorPair {
        CursorPair::resume(
            non_empty(&self.product_cursor).map(str::to_string),
            non_empty(&self.order_cursor).map(str::to_string),
        )
    }

    pub fn priority_ids(&self) -> Vec<String> {
        non_empty(&self.priority_product_ids)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &Option<String>) -> EnricherResult<Option<T>> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            EnricherError::validation_error(format!("{field} 不是有效的数字: {raw}"))
        }),
    }
}

/// 触发参数缺省时使用的默认值（来自 `jobs` 配置段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefaults {
    pub limit: u32,
    pub since_days: u32,
    pub max_products: u32,
    pub inter_batch_delay_ms: u64,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            limit: 50,
            since_days: 30,
            max_products: 250,
            inter_batch_delay_ms: 1000,
        }
    }
}

/// 分派给任务处理器的选项：原始参数加默认值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub params: TriggerParams,
    pub defaults: JobDefaults,
}

impl JobOptions {
    pub fn new(params: TriggerParams, defaults: JobDefaults) -> Self {
        Self { params, defaults }
    }

    pub fn tagging(&self) -> EnricherResult<TaggingOptions> {
        TaggingOptions::resolve(&self.params, &self.defaults)
    }

    pub fn analysis(&self) -> EnricherResult<AnalysisOptions> {
        AnalysisOptions::resolve(&self.params, &self.defaults)
    }
}

fn resolve_limit(params: &TriggerParams, defaults: &JobDefaults) -> EnricherResult<u32> {
    let limit = parse_number::<u32>("limit", &params.limit)?.unwrap_or(defaults.limit);
    if limit == 0 {
        return Err(EnricherError::validation_error("limit 必须大于0"));
    }
    Ok(limit.min(MAX_PAGE_SIZE))
}

/// 自动打标任务选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingOptions {
    pub limit: u32,
    pub since_days: u32,
    pub full_sync: bool,
    pub max_products: u32,
    pub product_cursor: Option<String>,
    pub order_cursor: Option<String>,
    #[serde(default)]
    pub priority_product_ids: Vec<String>,
    pub inter_batch_delay_ms: u64,
}

impl TaggingOptions {
    pub fn resolve(params: &TriggerParams, defaults: &JobDefaults) -> EnricherResult<Self> {
        let limit = resolve_limit(params, defaults)?;
        let since_days =
            parse_number::<u32>("sinceDays", &params.since_days)?.unwrap_or(defaults.since_days);
        let max_products = parse_number::<u32>("maxProducts", &params.max_products)?
            .unwrap_or(defaults.max_products);
        if max_products == 0 {
            return Err(EnricherError::validation_error("maxProducts 必须大于0"));
        }
        let cursors = params.cursors();

        Ok(Self {
            limit,
            since_days,
            full_sync: params.is_full_sync(),
            max_products,
            product_cursor: cursors.product_cursor,
            order_cursor: cursors.order_cursor,
            priority_product_ids: params.priority_ids(),
            inter_batch_delay_ms: defaults.inter_batch_delay_ms,
        })
    }

    pub fn cursors(&self) -> CursorPair {
        CursorPair::resume(self.product_cursor.clone(), self.order_cursor.clone())
    }

    /// 续跑任务的选项：从上次检查点继续
    pub fn continue_from(&self, cursors: &CursorPair) -> Self {
        Self {
            product_cursor: cursors.product_cursor.clone(),
            order_cursor: cursors.order_cursor.clone(),
            ..self.clone()
        }
    }
}

/// 库存分析任务选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub limit: u32,
    pub since_days: u32,
    pub product_cursor: Option<String>,
    pub order_cursor: Option<String>,
}

impl AnalysisOptions {
    pub fn resolve(params: &TriggerParams, defaults: &JobDefaults) -> EnricherResult<Self> {
        let cursors = params.cursors();
        Ok(Self {
            limit: resolve_limit(params, defaults)?,
            since_days: parse_number::<u32>("sinceDays", &params.since_days)?
                .unwrap_or(defaults.since_days),
            product_cursor: cursors.product_cursor,
            order_cursor: cursors.order_cursor,
        })
    }
}

/// 任务记录 `payload` 字段的结构
///
/// 选项只在持久化边界序列化为 JSON。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_type: JobType,
    pub options: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
}

impl JobPayload {
    pub fn new<O: Serialize>(job_type: JobType, options: &O) -> EnricherResult<Self> {
        Ok(Self {
            job_type,
            options: serde_json::to_value(options)?,
            parent_job_id: None,
        })
    }

    pub fn with_parent(mut self, parent_job_id: impl Into<String>) -> Self {
        self.parent_job_id = Some(parent_job_id.into());
        self
    }

    pub fn to_value(&self) -> EnricherResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// 自动打标任务结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingResult {
    pub processed_count: u64,
    pub updated_count: u64,
    pub batches_processed: u32,
    pub has_more_data: bool,
    pub last_cursor: Option<CursorPair>,
}

/// 库存分析任务结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub products_analyzed: u64,
    pub orders_analyzed: u64,
    pub window_days: u32,
    pub out_of_stock: Vec<String>,
    pub low_stock: Vec<String>,
    pub top_sellers: Vec<String>,
    pub total_units_sold: i64,
    pub has_more_data: bool,
}
