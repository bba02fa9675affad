use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    cache::CacheConfig,
    database::DatabaseConfig,
    jobs::JobsConfig,
    platform::{AuthConfig, PlatformConfig},
    server_observability::{AlertingConfig, ObservabilityConfig, ServerConfig},
};
use crate::retry::RetryConfig;

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/enricher.toml",
    "enricher.toml",
    "/etc/enricher/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub platform: PlatformConfig,
    pub auth: AuthConfig,
    pub jobs: JobsConfig,
    pub retry: RetryConfig,
    pub alerting: AlertingConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: ENRICHER_, separator: __)
    ///
    /// # Arguments
    ///
    /// * `config_path` - Config file path, if None try the default paths
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("ENRICHER")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("auth.api_keys")
                .with_list_parse_key("auth.trusted_ips")
                .with_list_parse_key("auth.trusted_proxies")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = ConfigBuilder::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()
            .context("解析TOML配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.server.validate().context("服务配置验证失败")?;
        self.database.validate().context("数据库配置验证失败")?;
        self.cache.validate().context("缓存配置验证失败")?;
        self.platform.validate().context("平台配置验证失败")?;
        self.jobs.validate().context("任务配置验证失败")?;
        self.alerting.validate().context("告警配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        if self.retry.backoff_factor < 1.0 {
            return Err(anyhow::anyhow!("重试退避倍数不能小于1"));
        }

        Ok(())
    }
}
