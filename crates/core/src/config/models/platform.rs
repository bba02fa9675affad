use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Commerce platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub shop_domain: String,
    /// 未设置时由店铺域名和API版本拼出
    pub endpoint: Option<String>,
    pub access_token: String,
    pub api_version: String,
    pub request_timeout_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            shop_domain: "demo.myshopify.com".to_string(),
            endpoint: None,
            access_token: String::new(),
            api_version: "2024-10".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl PlatformConfig {
    pub fn graphql_endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) if !endpoint.is_empty() => endpoint.clone(),
            _ => format!(
                "https://{}/admin/api/{}/graphql.json",
                self.shop_domain, self.api_version
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shop_domain.is_empty() {
            return Err(anyhow::anyhow!("店铺域名不能为空"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("平台请求超时时间必须大于0"));
        }

        Ok(())
    }
}

/// Trigger authentication configuration
///
/// API密钥与可信IP都为空时拒绝所有触发请求。
/// `x-forwarded-for` 只在直连对端属于 `trusted_proxies` 时才被采信。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_keys: Vec<String>,
    pub trusted_ips: Vec<String>,
    pub trusted_proxies: Vec<String>,
}

impl AuthConfig {
    pub fn accepts_key(&self, key: &str) -> bool {
        !key.is_empty() && self.api_keys.iter().any(|k| k == key)
    }

    pub fn trusts_ip(&self, ip: &str) -> bool {
        !ip.is_empty() && self.trusted_ips.iter().any(|t| t == ip)
    }

    pub fn trusts_proxy(&self, ip: &str) -> bool {
        !ip.is_empty() && self.trusted_proxies.iter().any(|t| t == ip)
    }
}
