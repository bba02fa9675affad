//! 配置管理
//!
//! 加载顺序：
//! 1. 内置默认值（每个配置段都实现 `Default`）
//! 2. TOML 配置文件（默认 `config/enricher.toml`）
//! 3. 环境变量覆盖（前缀 `ENRICHER_`，层级分隔符 `__`）
//!
//! ```rust,ignore
//! let config = AppConfig::load(Some("config/enricher.toml"))?;
//! println!("监听地址: {}", config.server.bind_address);
//! ```

pub mod models;

pub use models::*;
