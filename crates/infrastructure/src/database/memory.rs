//! 进程内存储，用于 `memory://` 模式和测试

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use enricher_core::models::{AlertRecord, JobRecord, LogRecord};
use enricher_core::traits::{AlertStore, JobStore, LogStore};
use enricher_errors::{EnricherError, EnricherResult};

#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    records: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn find(&self, id: &str) -> EnricherResult<Option<JobRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn create(&self, record: &JobRecord) -> EnricherResult<JobRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(EnricherError::validation_error(format!(
                "任务记录已存在: {}",
                record.id
            )));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn upsert(&self, record: &JobRecord) -> EnricherResult<JobRecord> {
        let mut records = self.records.write().await;
        let stored = match records.get(&record.id) {
            Some(existing) => JobRecord {
                created_at: existing.created_at,
                ..record.clone()
            },
            None => record.clone(),
        };
        records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLogStore {
    records: Arc<RwLock<Vec<LogRecord>>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<LogRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, record: &LogRecord) -> EnricherResult<i64> {
        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        records.push(LogRecord {
            id: Some(id),
            ..record.clone()
        });
        Ok(id)
    }

    async fn find_by_correlation(&self, correlation_id: &str) -> EnricherResult<Vec<LogRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAlertStore {
    records: Arc<RwLock<Vec<AlertRecord>>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<AlertRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn append(&self, record: &AlertRecord) -> EnricherResult<i64> {
        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        records.push(AlertRecord {
            id: Some(id),
            ..record.clone()
        });
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> EnricherResult<Vec<AlertRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_correlation(&self, correlation_id: &str) -> EnricherResult<Vec<AlertRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}
