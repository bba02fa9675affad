use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use enricher_core::config::AlertingConfig;
use enricher_core::models::{AlertRecord, CorrelationContext, LogCategory, Metadata, Severity};
use enricher_core::traits::AlertStore;
use enricher_errors::{EnricherError, EnricherResult};

use crate::event_logger::EventLogger;

/// Raises alerts: logs them, delivers them, and stores them as their own
/// queryable records. Raising an alert never fails.
pub struct AlertManager {
    logger: Arc<EventLogger>,
    alerts: Arc<dyn AlertStore>,
    notification_channels: Vec<Arc<dyn NotificationChannel>>,
}

impl AlertManager {
    pub fn new(logger: Arc<EventLogger>, alerts: Arc<dyn AlertStore>) -> Self {
        Self {
            logger,
            alerts,
            notification_channels: Vec::new(),
        }
    }

    /// Build a manager with the channels enabled in `config`
    pub fn from_config(
        logger: Arc<EventLogger>,
        alerts: Arc<dyn AlertStore>,
        config: &AlertingConfig,
    ) -> EnricherResult<Self> {
        let mut manager = Self::new(logger, alerts);

        if config.console_enabled {
            manager.add_notification_channel(Arc::new(ConsoleChannel::new()));
        }
        if let Some(url) = &config.webhook_url {
            let channel =
                WebhookChannel::new(url, Duration::from_secs(config.webhook_timeout_seconds))?;
            manager.add_notification_channel(Arc::new(channel));
        }

        info!(
            channels = ?manager.channel_names(),
            "Alert manager initialized"
        );
        Ok(manager)
    }

    pub fn add_notification_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.notification_channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.notification_channels
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn logger(&self) -> &Arc<EventLogger> {
        &self.logger
    }

    pub async fn raise(
        &self,
        ctx: &CorrelationContext,
        category: LogCategory,
        severity: Severity,
        title: &str,
        message: &str,
        metadata: Metadata,
    ) -> AlertRecord {
        let mut log_metadata = metadata.clone();
        log_metadata.insert("alert".to_string(), Value::Bool(true));
        log_metadata.insert("title".to_string(), Value::String(title.to_string()));
        self.logger
            .log_event(
                ctx,
                category,
                severity,
                "alert_raised",
                &format!("{title}: {message}"),
                log_metadata,
            )
            .await;

        metrics::counter!(
            "enricher_alerts_total",
            "severity" => severity.as_str(),
            "category" => category.as_str()
        )
        .increment(1);

        let mut record = AlertRecord {
            id: None,
            correlation_id: ctx.correlation_id.clone(),
            category,
            severity,
            title: title.to_string(),
            message: message.to_string(),
            metadata,
            channels: Vec::new(),
            created_at: Utc::now(),
        };

        for channel in &self.notification_channels {
            match channel.send_alert(&record).await {
                Ok(()) => record.channels.push(channel.name().to_string()),
                Err(e) => {
                    error!(
                        channel = channel.name(),
                        correlation_id = %record.correlation_id,
                        error = %e,
                        "Failed to send alert to notification channel"
                    );
                }
            }
        }

        match self.alerts.append(&record).await {
            Ok(id) => record.id = Some(id),
            Err(e) => {
                warn!(
                    correlation_id = %record.correlation_id,
                    title = %record.title,
                    error = %e,
                    "Failed to persist alert record"
                );
            }
        }

        record
    }

    /// Rejected triggers and other authentication problems, always WARNING
    pub async fn security_alert(
        &self,
        ctx: &CorrelationContext,
        title: &str,
        message: &str,
        metadata: Metadata,
    ) -> AlertRecord {
        self.raise(
            ctx,
            LogCategory::Security,
            Severity::Warning,
            title,
            message,
            metadata,
        )
        .await
    }

    pub async fn recent(&self, limit: usize) -> EnricherResult<Vec<AlertRecord>> {
        self.alerts.list_recent(limit).await
    }

    pub async fn for_correlation(&self, correlation_id: &str) -> EnricherResult<Vec<AlertRecord>> {
        self.alerts.find_by_correlation(correlation_id).await
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send_alert(&self, alert: &AlertRecord) -> EnricherResult<()>;
}

/// Writes alerts to the process log
#[derive(Debug, Default)]
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_alert(&self, alert: &AlertRecord) -> EnricherResult<()> {
        let severity = alert.severity.as_str().to_uppercase();
        if alert.severity >= Severity::Error {
            error!(
                channel = "console",
                correlation_id = %alert.correlation_id,
                category = %alert.category,
                severity = %severity,
                "ALERT {}: {}", alert.title, alert.message
            );
        } else {
            warn!(
                channel = "console",
                correlation_id = %alert.correlation_id,
                category = %alert.category,
                severity = %severity,
                "ALERT {}: {}", alert.title, alert.message
            );
        }
        Ok(())
    }
}

/// Posts alerts as JSON to an external endpoint
pub struct WebhookChannel {
    http: reqwest::Client,
    webhook_url: String,
}

impl WebhookChannel {
    pub fn new(webhook_url: &str, timeout: Duration) -> EnricherResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnricherError::config_error(format!("webhook client: {e}")))?;

        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
        })
    }

    fn body(alert: &AlertRecord) -> Value {
        json!({
            "title": alert.title,
            "message": alert.message,
            "severity": alert.severity,
            "category": alert.category,
            "correlationId": alert.correlation_id,
            "metadata": alert.metadata,
            "createdAt": alert.created_at,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_alert(&self, alert: &AlertRecord) -> EnricherResult<()> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&Self::body(alert))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnricherError::timeout_error(e.to_string())
                } else {
                    EnricherError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnricherError::http(
                status.as_u16(),
                format!("alert webhook rejected delivery: {status}"),
            ));
        }

        debug!(url = %self.webhook_url, title = %alert.title, "Webhook alert delivered");
        Ok(())
    }
}
