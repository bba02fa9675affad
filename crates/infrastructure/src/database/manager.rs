use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use enricher_core::config::DatabaseConfig;
use enricher_core::traits::{AlertStore, JobStore, LogStore};
use enricher_errors::{EnricherError, EnricherResult};

use super::memory::{InMemoryAlertStore, InMemoryJobStore, InMemoryLogStore};
use super::sqlite::{SqliteAlertStore, SqliteJobStore, SqliteLogStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        shop_domain TEXT NOT NULL,
        job_type TEXT NOT NULL,
        status TEXT NOT NULL,
        payload TEXT NOT NULL DEFAULT '{}',
        result TEXT,
        error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_shop_status ON jobs (shop_domain, status)",
    r#"
    CREATE TABLE IF NOT EXISTS job_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        correlation_id TEXT NOT NULL,
        job_id TEXT,
        category TEXT NOT NULL,
        severity TEXT NOT NULL,
        event TEXT NOT NULL,
        message TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_logs_correlation ON job_logs (correlation_id)",
    r#"
    CREATE TABLE IF NOT EXISTS job_alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        correlation_id TEXT NOT NULL,
        category TEXT NOT NULL,
        severity TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        channels TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_alerts_correlation ON job_alerts (correlation_id)",
];

/// The three bookkeeping stores handed to the dispatcher
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub logs: Arc<dyn LogStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobStore::new()),
            logs: Arc::new(InMemoryLogStore::new()),
            alerts: Arc::new(InMemoryAlertStore::new()),
        }
    }
}

/// SQLite connection pool plus schema bootstrap
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(url: &str, max_connections: u32) -> EnricherResult<Self> {
        Self::connect(url, max_connections, Duration::from_secs(30)).await
    }

    pub async fn from_config(config: &DatabaseConfig) -> EnricherResult<Self> {
        Self::connect(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.connection_timeout_seconds),
        )
        .await
    }

    async fn connect(url: &str, max_connections: u32, timeout: Duration) -> EnricherResult<Self> {
        info!("连接数据库: {}", url);
        let options = SqliteConnectOptions::from_str(url)
            .map_err(EnricherError::Database)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(EnricherError::Database)?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    /// 创建任务、日志和告警表（已存在时跳过）
    pub async fn migrate(&self) -> EnricherResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> EnricherResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    pub fn stores(&self) -> Stores {
        Stores {
            jobs: Arc::new(SqliteJobStore::new(self.pool.clone())),
            logs: Arc::new(SqliteLogStore::new(self.pool.clone())),
            alerts: Arc::new(SqliteAlertStore::new(self.pool.clone())),
        }
    }
}
