use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use enricher_core::models::{CorrelationContext, JobType, LogCategory, Severity};

use crate::alerting::AlertManager;
use crate::event_logger::to_metadata;

/// Times job executions and raises a WARNING alert for slow ones
pub struct PerformanceMonitor {
    alerts: Arc<AlertManager>,
}

impl PerformanceMonitor {
    pub fn new(alerts: Arc<AlertManager>) -> Self {
        Self { alerts }
    }

    /// Await `fut`, record its duration, and alert when it ran longer than
    /// `threshold`. The future's output is returned unchanged.
    pub async fn measure<F, T>(
        &self,
        ctx: &CorrelationContext,
        job_type: &JobType,
        threshold: Duration,
        fut: F,
    ) -> (T, Duration)
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        let elapsed = started.elapsed();

        metrics::histogram!(
            "enricher_job_duration_seconds",
            "job_type" => job_type.as_str().to_string()
        )
        .record(elapsed.as_secs_f64());

        debug!(
            correlation_id = %ctx.correlation_id,
            job.type = %job_type,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job execution measured"
        );

        if elapsed > threshold {
            self.alerts
                .raise(
                    ctx,
                    LogCategory::Performance,
                    Severity::Warning,
                    "Slow job execution",
                    &format!(
                        "{} took {} ms (threshold {} ms)",
                        job_type,
                        elapsed.as_millis(),
                        threshold.as_millis()
                    ),
                    to_metadata(json!({
                        "jobType": job_type.as_str(),
                        "durationMs": elapsed.as_millis() as u64,
                        "thresholdMs": threshold.as_millis() as u64,
                    })),
                )
                .await;
        }

        (output, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_logger::EventLogger;
    use enricher_infrastructure::database::{InMemoryAlertStore, InMemoryLogStore};

    fn monitor() -> (PerformanceMonitor, Arc<AlertManager>) {
        let logger = Arc::new(EventLogger::new(Arc::new(InMemoryLogStore::new())));
        let alerts = Arc::new(AlertManager::new(logger, Arc::new(InMemoryAlertStore::new())));
        (PerformanceMonitor::new(alerts.clone()), alerts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_raises_warning() {
        let (monitor, alerts) = monitor();
        let ctx = CorrelationContext::new("demo.myshopify.com");

        let (value, elapsed) = monitor
            .measure(&ctx, &JobType::AutoTagProducts, Duration::from_secs(1), async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                42
            })
            .await;

        assert_eq!(value, 42);
        assert!(elapsed >= Duration::from_secs(2));

        let raised = alerts.for_correlation(&ctx.correlation_id).await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, LogCategory::Performance);
        assert_eq!(raised[0].severity, Severity::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_job_is_quiet() {
        let (monitor, alerts) = monitor();
        let ctx = CorrelationContext::new("demo.myshopify.com");

        let (value, _) = monitor
            .measure(&ctx, &JobType::InventoryAnalysis, Duration::from_secs(30), async {
                "done"
            })
            .await;

        assert_eq!(value, "done");
        assert!(alerts.for_correlation(&ctx.correlation_id).await.unwrap().is_empty());
    }
}
