use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use enricher_api::{create_app, AppState};
use enricher_core::config::{AuthConfig, JobsConfig, ServerConfig, TagRulesConfig};
use enricher_dispatcher::{
    InventoryAnalysisHandler, JobDispatcher, JobRegistry, JobStateManager, RuleBasedTagAnalyzer,
    TaggingHandler,
};
use enricher_infrastructure::database::{InMemoryAlertStore, InMemoryJobStore, InMemoryLogStore};
use enricher_infrastructure::{CacheLayer, CatalogGateway};
use enricher_observability::{AlertManager, EventLogger};
use enricher_testing_utils::{fast_retry, sample_products, MockCommerceClient};

const API_KEY: &str = "cron-secret";
const TRUSTED_IP: &str = "10.0.0.7";
const PROXY_IP: &str = "192.0.2.10";

fn app() -> Router {
    let client = MockCommerceClient::new().with_products(sample_products(5));
    let gateway = CatalogGateway::new(Arc::new(client));
    let registry = JobRegistry::new()
        .register(Arc::new(TaggingHandler::new(
            gateway.clone(),
            CacheLayer::disabled(),
            Arc::new(RuleBasedTagAnalyzer::default()),
            fast_retry(),
        )))
        .register(Arc::new(InventoryAnalysisHandler::new(
            gateway,
            CacheLayer::disabled(),
            TagRulesConfig::default(),
        )));

    let logger = Arc::new(EventLogger::new(Arc::new(InMemoryLogStore::new())));
    let alerts = Arc::new(AlertManager::new(logger, Arc::new(InMemoryAlertStore::new())));
    let auth = AuthConfig {
        api_keys: vec![API_KEY.to_string()],
        trusted_ips: vec![TRUSTED_IP.to_string()],
        trusted_proxies: vec![PROXY_IP.to_string()],
    };
    let dispatcher = JobDispatcher::new(
        auth.clone(),
        "demo.myshopify.com",
        registry,
        JobStateManager::new(Arc::new(InMemoryJobStore::new())),
        alerts,
        JobsConfig {
            inter_batch_delay_ms: 0,
            ..JobsConfig::default()
        },
    );

    create_app(
        AppState::new(Arc::new(dispatcher), auth),
        &ServerConfig::default(),
    )
}

fn trigger(body: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/cron")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = app();

    let (status, body) = send(&app, get("/api/cron", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("available"));
    assert!(body["timestamp"].is_string());

    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["jobTypes"],
        json!(["auto-tag-products", "inventory-analysis"])
    );
    assert_eq!(body["cache"]["enabled"], json!(false));
    assert_eq!(body["cache"]["stats"]["hits"], json!(0));
}

#[tokio::test]
async fn test_trigger_with_api_key() {
    let app = app();

    let (status, body) = send(
        &app,
        trigger(
            "job=auto-tag-products&limit=2&fullSync=false",
            &[("x-api-key", API_KEY)],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["processedCount"], json!(2));
    assert_eq!(body["batchesProcessed"], json!(1));
    assert_eq!(body["hasMoreData"], json!(true));
    assert!(body["requestId"].is_string());
}

#[tokio::test]
async fn test_trigger_without_credentials_is_401() {
    let app = app();

    let (status, body) = send(&app, trigger("job=auto-tag-products", &[])).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
    assert!(body["requestId"].is_string());
}

#[tokio::test]
async fn test_trigger_from_trusted_forwarded_ip() {
    let app = app();

    let (status, body) = send(
        &app,
        from_peer(
            trigger("job=inventory-analysis", &[("x-forwarded-for", TRUSTED_IP)]),
            PROXY_IP,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_trusted_peer_without_proxy_is_accepted() {
    let app = app();

    let (status, body) = send(
        &app,
        from_peer(trigger("job=inventory-analysis", &[]), TRUSTED_IP),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_spoofed_forwarded_ip_is_rejected() {
    let app = app();

    let (status, body) = send(
        &app,
        from_peer(
            trigger("job=auto-tag-products", &[("x-forwarded-for", TRUSTED_IP)]),
            "203.0.113.9",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (_, body) = send(&app, get("/api/alerts", Some(API_KEY))).await;
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["category"], json!("security"));
}

fn json_trigger(body: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/cron")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_unparsable_body_gets_json_failure() {
    let app = app();

    let (status, body) = send(
        &app,
        json_trigger(r#"{"job":"auto-tag-products"}"#, Some(API_KEY)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert!(body["requestId"].is_string());
    assert!(body["message"].as_str().unwrap().contains("请求参数无法解析"));
}

#[tokio::test]
async fn test_unparsable_body_without_credentials_is_401() {
    let app = app();

    let (status, body) = send(&app, json_trigger("{}", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
    assert!(body["requestId"].is_string());

    let (_, body) = send(&app, get("/api/alerts", Some(API_KEY))).await;
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["category"], json!("security"));
}

#[tokio::test]
async fn test_failed_job_is_still_200() {
    let app = app();

    let (status, body) = send(
        &app,
        trigger("job=unknown-job", &[("x-api-key", API_KEY)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_run_trail_lookup() {
    let app = app();
    let (_, triggered) = send(
        &app,
        trigger("job=auto-tag-products&limit=2", &[("x-api-key", API_KEY)]),
    )
    .await;
    let request_id = triggered["requestId"].as_str().unwrap().to_string();
    let uri = format!("/api/runs/{}", request_id);

    let (status, _) = send(&app, get(&uri, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, get(&uri, Some(API_KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["requestId"], json!(request_id));
    assert_eq!(body["data"]["job"]["status"], json!("completed"));
    assert!(!body["data"]["logs"].as_array().unwrap().is_empty());

    let (status, body) = send(&app, get("/api/runs/no-such-run", Some(API_KEY))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_alert_listing() {
    let app = app();
    send(&app, trigger("job=auto-tag-products", &[("x-api-key", "wrong")])).await;

    let (status, body) = send(&app, get("/api/alerts?limit=5", Some(API_KEY))).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], json!("warning"));
    assert_eq!(alerts[0]["category"], json!("security"));

    let (status, _) = send(&app, get("/api/alerts?limit=0", Some(API_KEY))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_disabled_is_404() {
    let app = app();

    let (status, _) = send(&app, get("/metrics", None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
