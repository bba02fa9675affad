//! Structured, correlated event logging
//!
//! Each event is emitted twice: once as a `tracing` event for the process
//! log, and once as a [`LogRecord`] appended to the structured log store so
//! a run's timeline can be rebuilt from its correlation id.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use enricher_core::models::{CorrelationContext, LogCategory, LogRecord, Metadata, Severity};
use enricher_core::traits::LogStore;
use enricher_errors::EnricherResult;

/// Turn a JSON value into a metadata bag. Non-object values are kept under `value`.
pub fn to_metadata(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        Value::Null => Metadata::new(),
        other => {
            let mut map = Metadata::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

pub struct EventLogger {
    logs: Arc<dyn LogStore>,
}

impl EventLogger {
    pub fn new(logs: Arc<dyn LogStore>) -> Self {
        Self { logs }
    }

    /// Emit one event and persist it. Returns the stored record id, or
    /// `None` when the log store rejected the write.
    pub async fn log_event(
        &self,
        ctx: &CorrelationContext,
        category: LogCategory,
        severity: Severity,
        event: &str,
        message: &str,
        metadata: Metadata,
    ) -> Option<i64> {
        let record =
            LogRecord::new(ctx, category, severity, event, message).with_metadata(metadata);
        emit(&record, &ctx.shop);

        match self.logs.append(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    correlation_id = %record.correlation_id,
                    event = %record.event,
                    error = %e,
                    "Failed to persist log record"
                );
                None
            }
        }
    }

    /// Job lifecycle events (started, completed, failed, follow-up scheduled)
    pub async fn log_job_event(
        &self,
        ctx: &CorrelationContext,
        severity: Severity,
        event: &str,
        message: &str,
        metadata: Metadata,
    ) -> Option<i64> {
        self.log_event(ctx, LogCategory::Job, severity, event, message, metadata)
            .await
    }

    /// Inbound trigger events. `source` is the trigger's category, usually
    /// `cron` or `webhook`.
    pub async fn log_trigger_event(
        &self,
        ctx: &CorrelationContext,
        source: LogCategory,
        event: &str,
        message: &str,
        metadata: Metadata,
    ) -> Option<i64> {
        self.log_event(ctx, source, Severity::Info, event, message, metadata)
            .await
    }

    pub async fn log_system_event(
        &self,
        ctx: &CorrelationContext,
        severity: Severity,
        event: &str,
        message: &str,
        metadata: Metadata,
    ) -> Option<i64> {
        self.log_event(ctx, LogCategory::System, severity, event, message, metadata)
            .await
    }

    pub async fn log_security_event(
        &self,
        ctx: &CorrelationContext,
        event: &str,
        message: &str,
        metadata: Metadata,
    ) -> Option<i64> {
        self.log_event(
            ctx,
            LogCategory::Security,
            Severity::Warning,
            event,
            message,
            metadata,
        )
        .await
    }

    /// All persisted records of one run, oldest first
    pub async fn timeline(&self, correlation_id: &str) -> EnricherResult<Vec<LogRecord>> {
        self.logs.find_by_correlation(correlation_id).await
    }
}

fn emit(record: &LogRecord, shop: &str) {
    let job_id = record.job_id.as_deref().unwrap_or("-");
    match record.severity {
        Severity::Debug => debug!(
            correlation_id = %record.correlation_id,
            job.id = job_id,
            shop = shop,
            category = %record.category,
            event = %record.event,
            metadata = ?record.metadata,
            "{}", record.message
        ),
        Severity::Info => info!(
            correlation_id = %record.correlation_id,
            job.id = job_id,
            shop = shop,
            category = %record.category,
            event = %record.event,
            metadata = ?record.metadata,
            "{}", record.message
        ),
        Severity::Warning => warn!(
            correlation_id = %record.correlation_id,
            job.id = job_id,
            shop = shop,
            category = %record.category,
            event = %record.event,
            metadata = ?record.metadata,
            "{}", record.message
        ),
        Severity::Error | Severity::Critical => error!(
            correlation_id = %record.correlation_id,
            job.id = job_id,
            shop = shop,
            category = %record.category,
            severity = %record.severity,
            event = %record.event,
            metadata = ?record.metadata,
            "{}", record.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use enricher_errors::EnricherError;
    use enricher_infrastructure::database::InMemoryLogStore;
    use serde_json::json;

    struct UnavailableLogStore;

    #[async_trait]
    impl LogStore for UnavailableLogStore {
        async fn append(&self, _record: &LogRecord) -> EnricherResult<i64> {
            Err(EnricherError::database_error("log store offline"))
        }

        async fn find_by_correlation(&self, _correlation_id: &str) -> EnricherResult<Vec<LogRecord>> {
            Err(EnricherError::database_error("log store offline"))
        }
    }

    #[test]
    fn test_to_metadata() {
        let map = to_metadata(json!({"limit": 2}));
        assert_eq!(map.get("limit"), Some(&json!(2)));
        assert!(to_metadata(Value::Null).is_empty());
        assert_eq!(to_metadata(json!(5)).get("value"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_emitters_share_correlation_id() {
        let store = Arc::new(InMemoryLogStore::new());
        let logger = EventLogger::new(store.clone());
        let ctx = CorrelationContext::new("demo.myshopify.com");

        logger
            .log_trigger_event(&ctx, LogCategory::Cron, "trigger_received", "cron trigger", Metadata::new())
            .await;
        logger
            .log_job_event(&ctx, Severity::Info, "job_started", "started", to_metadata(json!({"limit": 2})))
            .await;
        logger
            .log_security_event(&ctx, "auth_checked", "ok", Metadata::new())
            .await;

        let timeline = logger.timeline(&ctx.correlation_id).await.unwrap();
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].category, LogCategory::Cron);
        assert_eq!(timeline[1].category, LogCategory::Job);
        assert_eq!(timeline[1].metadata.get("limit"), Some(&json!(2)));
        assert_eq!(timeline[2].severity, Severity::Warning);
        assert!(timeline.iter().all(|r| r.correlation_id == ctx.correlation_id));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_propagated() {
        let logger = EventLogger::new(Arc::new(UnavailableLogStore));
        let ctx = CorrelationContext::new("demo.myshopify.com");

        let id = logger
            .log_system_event(&ctx, Severity::Error, "boom", "still fine", Metadata::new())
            .await;
        assert!(id.is_none());
    }
}
