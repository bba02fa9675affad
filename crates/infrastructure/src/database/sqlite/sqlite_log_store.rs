use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use enricher_core::models::{LogCategory, LogRecord, Metadata, Severity};
use enricher_core::traits::LogStore;
use enricher_errors::EnricherResult;

use super::decode_error;

pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> EnricherResult<LogRecord> {
        let category: String = row.try_get("category")?;
        let severity: String = row.try_get("severity")?;
        let metadata: Json<Metadata> = row.try_get("metadata")?;

        Ok(LogRecord {
            id: Some(row.try_get("id")?),
            correlation_id: row.try_get("correlation_id")?,
            job_id: row.try_get("job_id")?,
            category: category
                .parse::<LogCategory>()
                .map_err(|e| decode_error("category", e))?,
            severity: severity
                .parse::<Severity>()
                .map_err(|e| decode_error("severity", e))?,
            event: row.try_get("event")?,
            message: row.try_get("message")?,
            metadata: metadata.0,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    #[instrument(skip(self, record), fields(correlation_id = %record.correlation_id, event = %record.event))]
    async fn append(&self, record: &LogRecord) -> EnricherResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_logs (correlation_id, job_id, category, severity, event, message, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.correlation_id)
        .bind(&record.job_id)
        .bind(record.category.as_str())
        .bind(record.severity.as_str())
        .bind(&record.event)
        .bind(&record.message)
        .bind(Json(&record.metadata))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn find_by_correlation(&self, correlation_id: &str) -> EnricherResult<Vec<LogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, correlation_id, job_id, category, severity, event, message, metadata, created_at
            FROM job_logs WHERE correlation_id = ?1 ORDER BY id ASC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
