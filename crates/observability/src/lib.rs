//! Correlation fabric for enrichment runs
//!
//! Every run threads one correlation id through its structured log
//! records, alerts and job records. [`EventLogger`] is the single
//! primitive all log emitters funnel into; [`AlertManager`] builds on it,
//! so every alert is also a log record.

pub mod alerting;
pub mod event_logger;
pub mod performance;
pub mod telemetry;

pub use alerting::{AlertManager, ConsoleChannel, NotificationChannel, WebhookChannel};
pub use event_logger::{to_metadata, EventLogger};
pub use performance::PerformanceMonitor;
pub use telemetry::{init_logging, LogFormat};
