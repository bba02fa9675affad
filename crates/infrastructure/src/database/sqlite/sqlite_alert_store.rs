use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use enricher_core::models::{AlertRecord, LogCategory, Metadata, Severity};
use enricher_core::traits::AlertStore;
use enricher_errors::EnricherResult;

use super::decode_error;

const COLUMNS: &str = "id, correlation_id, category, severity, title, message, metadata, channels, created_at";

pub struct SqliteAlertStore {
    pool: SqlitePool,
}

impl SqliteAlertStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> EnricherResult<AlertRecord> {
        let category: String = row.try_get("category")?;
        let severity: String = row.try_get("severity")?;
        let metadata: Json<Metadata> = row.try_get("metadata")?;
        let channels: Json<Vec<String>> = row.try_get("channels")?;

        Ok(AlertRecord {
            id: Some(row.try_get("id")?),
            correlation_id: row.try_get("correlation_id")?,
            category: category
                .parse::<LogCategory>()
                .map_err(|e| decode_error("category", e))?,
            severity: severity
                .parse::<Severity>()
                .map_err(|e| decode_error("severity", e))?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            metadata: metadata.0,
            channels: channels.0,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    #[instrument(skip(self, record), fields(correlation_id = %record.correlation_id, severity = %record.severity))]
    async fn append(&self, record: &AlertRecord) -> EnricherResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_alerts (correlation_id, category, severity, title, message, metadata, channels, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.correlation_id)
        .bind(record.category.as_str())
        .bind(record.severity.as_str())
        .bind(&record.title)
        .bind(&record.message)
        .bind(Json(&record.metadata))
        .bind(Json(&record.channels))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn list_recent(&self, limit: usize) -> EnricherResult<Vec<AlertRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM job_alerts ORDER BY id DESC LIMIT ?1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    #[instrument(skip(self))]
    async fn find_by_correlation(&self, correlation_id: &str) -> EnricherResult<Vec<AlertRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM job_alerts WHERE correlation_id = ?1 ORDER BY id ASC"
        ))
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
