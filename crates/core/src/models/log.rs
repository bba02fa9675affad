use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::correlation::CorrelationContext;

/// 事件分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Cron,
    Webhook,
    System,
    Job,
    Security,
    Performance,
    Cache,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Cron => "cron",
            LogCategory::Webhook => "webhook",
            LogCategory::System => "system",
            LogCategory::Job => "job",
            LogCategory::Security => "security",
            LogCategory::Performance => "performance",
            LogCategory::Cache => "cache",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron" => Ok(LogCategory::Cron),
            "webhook" => Ok(LogCategory::Webhook),
            "system" => Ok(LogCategory::System),
            "job" => Ok(LogCategory::Job),
            "security" => Ok(LogCategory::Security),
            "performance" => Ok(LogCategory::Performance),
            "cache" => Ok(LogCategory::Cache),
            _ => Err(format!("Invalid log category: {s}")),
        }
    }
}

/// 严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Invalid severity: {s}")),
        }
    }
}

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// 结构化日志记录，写入日志存储
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: Option<i64>,
    pub correlation_id: String,
    pub job_id: Option<String>,
    pub category: LogCategory,
    pub severity: Severity,
    pub event: String,
    pub message: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(
        ctx: &CorrelationContext,
        category: LogCategory,
        severity: Severity,
        event: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            correlation_id: ctx.correlation_id.clone(),
            job_id: Some(ctx.job_id.clone()),
            category,
            severity,
            event: event.into(),
            message: message.into(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }
}

/// 告警记录，独立于普通日志流单独存储
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: Option<i64>,
    pub correlation_id: String,
    pub category: LogCategory,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub metadata: Metadata,
    /// 成功投递的通知渠道
    pub channels: Vec<String>,
    pub created_at: DateTime<Utc>,
}
