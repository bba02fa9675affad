use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use enricher_errors::{EnricherError, EnricherResult};

/// 任务类型
///
/// 已知类型之外的名称保留为 `Custom`，由任务注册表决定是否可以执行。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    AutoTagProducts,
    InventoryAnalysis,
    Custom(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::AutoTagProducts => "auto-tag-products",
            JobType::InventoryAnalysis => "inventory-analysis",
            JobType::Custom(name) => name.as_str(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, JobType::Custom(_))
    }
}

impl From<String> for JobType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto-tag-products" | "auto-tag" | "tagging" => JobType::AutoTagProducts,
            "inventory-analysis" | "analyze-inventory" | "analysis" => JobType::InventoryAnalysis,
            _ => JobType::Custom(value.trim().to_string()),
        }
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for JobType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JobType::from(s.to_string()))
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态
///
/// 状态机: `queued → running → {completed | failed}`，
/// 任务也可以直接以 `running`（手动触发）或 `scheduled`（后续续跑任务）开始。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Scheduled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Scheduled => "scheduled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 相同状态的重复写入视为合法（幂等）
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            JobStatus::Scheduled => matches!(
                next,
                JobStatus::Queued | JobStatus::Running | JobStatus::Failed
            ),
            JobStatus::Queued => matches!(next, JobStatus::Running | JobStatus::Failed),
            JobStatus::Running => matches!(next, JobStatus::Completed | JobStatus::Failed),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = EnricherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "scheduled" => Ok(JobStatus::Scheduled),
            _ => Err(EnricherError::validation_error(format!(
                "Invalid job status: {s}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<JobStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务记录：一次已调度或正在运行的工作单元
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub shop_domain: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(
        id: impl Into<String>,
        shop_domain: impl Into<String>,
        job_type: JobType,
        status: JobStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            shop_domain: shop_domain.into(),
            job_type,
            status,
            payload: serde_json::Value::Null,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: status.is_terminal().then_some(now),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// 应用状态变更，返回变更是否被接受。
    ///
    /// 被拒绝的变更（例如离开 `completed`）不会修改记录。
    pub fn apply_status(&mut self, status: JobStatus, message: Option<&str>) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }

        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        match status {
            JobStatus::Completed => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
            }
            JobStatus::Failed => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
                if let Some(message) = message {
                    self.error = Some(message.to_string());
                }
            }
            _ => {}
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> EnricherResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn result_as<T: DeserializeOwned>(&self) -> EnricherResult<Option<T>> {
        match &self.result {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|completed| (completed - self.created_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_parsing() {
        assert_eq!(
            "auto-tag-products".parse::<JobType>().unwrap(),
            JobType::AutoTagProducts
        );
        assert_eq!("tagging".parse::<JobType>().unwrap(), JobType::AutoTagProducts);
        assert_eq!(
            "analyze-inventory".parse::<JobType>().unwrap(),
            JobType::InventoryAnalysis
        );
        assert_eq!(
            "reindex".parse::<JobType>().unwrap(),
            JobType::Custom("reindex".to_string())
        );
        assert_eq!(JobType::InventoryAnalysis.to_string(), "inventory-analysis");
    }

    #[test]
    fn test_job_type_serde_round_trip_as_string() {
        let json = serde_json::to_string(&JobType::AutoTagProducts).unwrap();
        assert_eq!(json, "\"auto-tag-products\"");
        let back: JobType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobType::AutoTagProducts);
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Scheduled.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Running));

        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn test_completed_at_set_only_for_terminal_status() {
        let mut job = JobRecord::new("job-1", "shop.example", JobType::AutoTagProducts, JobStatus::Running);
        assert!(job.completed_at.is_none());

        assert!(job.apply_status(JobStatus::Completed, None));
        assert!(job.completed_at.is_some());
        assert!(job.is_finished());

        let completed_at = job.completed_at;
        assert!(!job.apply_status(JobStatus::Running, None));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, completed_at);
    }

    #[test]
    fn test_failed_status_records_error() {
        let mut job = JobRecord::new("job-2", "shop.example", JobType::InventoryAnalysis, JobStatus::Running);
        assert!(job.apply_status(JobStatus::Failed, Some("platform unavailable")));
        assert_eq!(job.error.as_deref(), Some("platform unavailable"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_new_terminal_record_has_completed_at() {
        let job = JobRecord::new("job-3", "shop.example", JobType::AutoTagProducts, JobStatus::Failed);
        assert!(job.completed_at.is_some());
    }
}
