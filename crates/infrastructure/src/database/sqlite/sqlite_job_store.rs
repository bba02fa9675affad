use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use enricher_core::models::{JobRecord, JobType};
use enricher_core::traits::JobStore;
use enricher_errors::EnricherResult;

const COLUMNS: &str = "id, shop_domain, job_type, status, payload, result, error, created_at, updated_at, completed_at";

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> EnricherResult<JobRecord> {
        let job_type: String = row.try_get("job_type")?;
        let payload: Json<Value> = row.try_get("payload")?;
        let result: Option<Json<Value>> = row.try_get("result")?;

        Ok(JobRecord {
            id: row.try_get("id")?,
            shop_domain: row.try_get("shop_domain")?,
            job_type: JobType::from(job_type),
            status: row.try_get("status")?,
            payload: payload.0,
            result: result.map(|r| r.0),
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self))]
    async fn find(&self, id: &str) -> EnricherResult<Option<JobRecord>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    #[instrument(skip(self, record), fields(job.id = %record.id, status = %record.status))]
    async fn create(&self, record: &JobRecord) -> EnricherResult<JobRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs ({COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&record.id)
        .bind(&record.shop_domain)
        .bind(record.job_type.as_str())
        .bind(record.status)
        .bind(Json(&record.payload))
        .bind(record.result.as_ref().map(Json))
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.completed_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("创建任务记录: {}", record.id);
        Self::row_to_record(&row)
    }

    #[instrument(skip(self, record), fields(job.id = %record.id, status = %record.status))]
    async fn upsert(&self, record: &JobRecord) -> EnricherResult<JobRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs ({COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                shop_domain = excluded.shop_domain,
                job_type = excluded.job_type,
                status = excluded.status,
                payload = excluded.payload,
                result = excluded.result,
                error = excluded.error,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&record.id)
        .bind(&record.shop_domain)
        .bind(record.job_type.as_str())
        .bind(record.status)
        .bind(Json(&record.payload))
        .bind(record.result.as_ref().map(Json))
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.completed_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("写入任务记录: {} -> {}", record.id, record.status);
        Self::row_to_record(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use enricher_core::models::JobStatus;
    use serde_json::json;

    async fn store() -> SqliteJobStore {
        let manager = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        SqliteJobStore::new(manager.pool().clone())
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_record() {
        let store = store().await;
        let mut record = JobRecord::new(
            "job-1",
            "demo.myshopify.com",
            JobType::AutoTagProducts,
            JobStatus::Running,
        )
        .with_payload(json!({"jobType": "auto-tag-products"}));

        let first = store.upsert(&record).await.unwrap();
        record.apply_status(JobStatus::Completed, None);
        record.result = Some(json!({"processedCount": 2}));
        let second = store.upsert(&record).await.unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.status, JobStatus::Completed);
        assert!(second.completed_at.is_some());
        assert_eq!(second.result, Some(json!({"processedCount": 2})));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_find_and_create() {
        let store = store().await;
        assert!(store.find("missing").await.unwrap().is_none());

        let record = JobRecord::new(
            "job-2",
            "demo.myshopify.com",
            JobType::InventoryAnalysis,
            JobStatus::Scheduled,
        );
        store.create(&record).await.unwrap();
        assert!(store.create(&record).await.is_err());

        let found = store.find("job-2").await.unwrap().unwrap();
        assert_eq!(found.job_type, JobType::InventoryAnalysis);
        assert_eq!(found.status, JobStatus::Scheduled);
        assert!(found.completed_at.is_none());
    }
}
