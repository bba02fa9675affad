use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use enricher_core::config::AuthConfig;
use enricher_dispatcher::TriggerCredentials;

use crate::error::ApiError;
use crate::routes::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// 请求方身份：API 密钥和客户端 IP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    pub api_key: Option<String>,
    pub remote_ip: Option<String>,
}

impl ClientIdentity {
    /// 直连对端是可信代理时才读取 `x-forwarded-for`，否则以对端地址为准
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>, auth: &AuthConfig) -> Self {
        let peer_ip = peer.map(|addr| addr.ip().to_string());
        let remote_ip = match peer_ip {
            Some(ip) if auth.trusts_proxy(&ip) => forwarded_client(headers, auth).or(Some(ip)),
            other => other,
        };

        Self {
            api_key: extract_api_key(headers),
            remote_ip,
        }
    }

    pub fn into_credentials(self) -> TriggerCredentials {
        TriggerCredentials {
            api_key: self.api_key,
            remote_ip: self.remote_ip,
            trusted_local: false,
        }
    }
}

impl FromRequestParts<AppState> for ClientIdentity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer, &state.auth))
    }
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// 从右往左跳过可信代理，第一个不可信的地址即客户端
///
/// 左侧的条目由客户端自己填写，不能直接采信。
fn forwarded_client(headers: &HeaderMap, auth: &AuthConfig) -> Option<String> {
    let hops: Vec<&str> = headers
        .get_all(FORWARDED_FOR_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    hops.iter()
        .rev()
        .find(|hop| !auth.trusts_proxy(hop))
        .or_else(|| hops.first())
        .map(|hop| hop.to_string())
}

/// 查询类接口只接受 API 密钥
pub async fn require_api_key(
    State(state): State<AppState>,
    identity: ClientIdentity,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let accepted = identity
        .api_key
        .as_deref()
        .is_some_and(|key| state.auth.accepts_key(key));
    if !accepted {
        warn!(
            path = %req.uri().path(),
            remote_ip = identity.remote_ip.as_deref().unwrap_or("-"),
            "查询接口认证失败"
        );
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}
