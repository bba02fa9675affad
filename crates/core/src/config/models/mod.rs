pub mod app_config;
pub mod cache;
pub mod database;
pub mod jobs;
pub mod platform;
pub mod server_observability;

pub use app_config::AppConfig;
pub use cache::{CacheConfig, CacheTtlConfig};
pub use database::DatabaseConfig;
pub use jobs::{JobsConfig, TagRulesConfig};
pub use platform::{AuthConfig, PlatformConfig};
pub use server_observability::{AlertingConfig, ObservabilityConfig, ServerConfig};
