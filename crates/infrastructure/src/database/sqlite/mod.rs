pub mod sqlite_alert_store;
pub mod sqlite_job_store;
pub mod sqlite_log_store;

pub use sqlite_alert_store::SqliteAlertStore;
pub use sqlite_job_store::SqliteJobStore;
pub use sqlite_log_store::SqliteLogStore;

use enricher_errors::EnricherError;

pub(crate) fn decode_error(column: &str, detail: impl std::fmt::Display) -> EnricherError {
    EnricherError::database_error(format!("无法解析字段 {column}: {detail}"))
}
