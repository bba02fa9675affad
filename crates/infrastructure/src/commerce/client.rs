use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use enricher_core::config::PlatformConfig;
use enricher_core::traits::CommerceClient;
use enricher_errors::{EnricherError, EnricherResult};

pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

const MAX_ERROR_BODY: usize = 512;

/// Admin GraphQL client over reqwest
#[derive(Clone)]
pub struct GraphqlCommerceClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl GraphqlCommerceClient {
    pub fn new(config: &PlatformConfig) -> EnricherResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EnricherError::config_error(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.graphql_endpoint(),
            access_token: config.access_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_error(e: reqwest::Error) -> EnricherError {
    if e.is_timeout() {
        EnricherError::timeout_error(e.to_string())
    } else {
        EnricherError::network(e.to_string())
    }
}

/// Maps a non-success status to the error taxonomy
pub(crate) fn status_error(status: u16, body: &str) -> EnricherError {
    let mut message: String = body.chars().take(MAX_ERROR_BODY).collect();
    if message.is_empty() {
        message = format!("HTTP {status}");
    }
    if status == 429 {
        EnricherError::RateLimited(message)
    } else {
        EnricherError::http(status, message)
    }
}

/// Extracts `data` from a GraphQL response body, surfacing `errors`
pub(crate) fn extract_data(mut body: Value) -> EnricherResult<Value> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let throttled = errors.iter().any(|e| {
                e.pointer("/extensions/code").and_then(Value::as_str) == Some("THROTTLED")
            });
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(if throttled {
                EnricherError::RateLimited(message)
            } else {
                EnricherError::platform(message)
            });
        }
    }

    match body.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(EnricherError::platform("响应缺少data字段")),
    }
}

#[async_trait]
impl CommerceClient for GraphqlCommerceClient {
    #[instrument(skip(self, document, variables))]
    async fn query(&self, document: &str, variables: Value) -> EnricherResult<Value> {
        let started = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        metrics::histogram!("enricher_platform_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("平台请求失败: HTTP {}", status.as_u16());
            return Err(status_error(status.as_u16(), &body));
        }

        let body: Value = response.json().await.map_err(transport_error)?;
        debug!("平台请求完成，耗时 {:?}", started.elapsed());
        extract_data(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(429, "slow down"), EnricherError::RateLimited(_)));
        let err = status_error(502, "");
        assert!(matches!(err, EnricherError::Http { status: 502, .. }));
        assert!(err.is_retryable());
        assert!(!status_error(401, "bad token").is_retryable());
    }

    #[test]
    fn test_extract_data() {
        let data = extract_data(json!({"data": {"shop": {"name": "Demo"}}})).unwrap();
        assert_eq!(data["shop"]["name"], "Demo");

        let err = extract_data(json!({"errors": [{"message": "Field missing"}]})).unwrap_err();
        assert!(matches!(err, EnricherError::Platform(ref m) if m == "Field missing"));

        let err = extract_data(json!({
            "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}]
        }))
        .unwrap_err();
        assert!(matches!(err, EnricherError::RateLimited(_)));

        assert!(extract_data(json!({"data": null})).is_err());
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = PlatformConfig {
            shop_domain: "acme.myshopify.com".to_string(),
            ..Default::default()
        };
        let client = GraphqlCommerceClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://acme.myshopify.com/admin/api/2024-10/graphql.json"
        );
    }
}
