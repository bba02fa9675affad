pub mod alerts;
pub mod cron;
pub mod health;
pub mod metrics;
pub mod runs;

pub const SERVICE_NAME: &str = "catalog-enricher";
