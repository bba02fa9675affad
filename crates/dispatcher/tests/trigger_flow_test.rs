use std::sync::Arc;

use serde_json::{json, Value};

use enricher_core::config::{AuthConfig, JobsConfig, TagRulesConfig};
use enricher_core::models::{JobStatus, LogCategory, TriggerParams};
use enricher_core::traits::{JobStore, LogStore};
use enricher_dispatcher::{
    InventoryAnalysisHandler, JobDispatcher, JobRegistry, JobStateManager, RuleBasedTagAnalyzer,
    TaggingHandler, TriggerCredentials, TriggerRequest, TriggerResponse,
};
use enricher_infrastructure::database::{InMemoryAlertStore, InMemoryJobStore, InMemoryLogStore};
use enricher_infrastructure::{CacheLayer, CatalogGateway};
use enricher_observability::{AlertManager, EventLogger};
use enricher_dispatcher::handlers::tagging::{TAG_BEST_SELLER, TAG_SLOW_MOVER};
use enricher_testing_utils::{
    fast_retry, sample_products, CallKind, MockCommerceClient, OrderBuilder, RecordingChannel,
};

const SHOP: &str = "demo.myshopify.com";
const API_KEY: &str = "cron-secret";

struct Harness {
    dispatcher: JobDispatcher,
    client: MockCommerceClient,
    jobs: Arc<InMemoryJobStore>,
    logs: Arc<InMemoryLogStore>,
    channel: Arc<RecordingChannel>,
}

impl Harness {
    fn new(client: MockCommerceClient) -> Self {
        let jobs = Arc::new(InMemoryJobStore::new());
        let logs = Arc::new(InMemoryLogStore::new());
        let channel = Arc::new(RecordingChannel::new());

        let logger = Arc::new(EventLogger::new(logs.clone()));
        let mut alerts = AlertManager::new(logger, Arc::new(InMemoryAlertStore::new()));
        alerts.add_notification_channel(channel.clone());

        let gateway = CatalogGateway::new(Arc::new(client.clone()));
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

        let dispatcher = JobDispatcher::new(
            AuthConfig {
                api_keys: vec![API_KEY.to_string()],
                trusted_ips: vec!["10.0.0.7".to_string()],
                ..AuthConfig::default()
            },
            SHOP,
            registry,
            JobStateManager::new(jobs.clone()).with_retry(fast_retry()),
            Arc::new(alerts),
            JobsConfig {
                inter_batch_delay_ms: 0,
                ..JobsConfig::default()
            },
        );

        Self {
            dispatcher,
            client,
            jobs,
            logs,
            channel,
        }
    }

    async fn trigger(&self, pairs: &[(&str, &str)]) -> TriggerResponse {
        let credentials = TriggerCredentials {
            api_key: Some(API_KEY.to_string()),
            ..Default::default()
        };
        self.dispatcher
            .handle_trigger(TriggerRequest::cron(credentials, params(pairs)))
            .await
    }
}

fn params(pairs: &[(&str, &str)]) -> TriggerParams {
    let map: serde_json::Map<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    serde_json::from_value(Value::Object(map)).unwrap()
}

fn catalog(count: usize) -> MockCommerceClient {
    MockCommerceClient::new().with_products(sample_products(count))
}

#[tokio::test]
async fn test_single_page_tagging_run() {
    let harness = Harness::new(catalog(5));

    let response = harness
        .trigger(&[("job", "auto-tag-products"), ("limit", "2"), ("fullSync", "false")])
        .await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.processed_count, Some(2));
    assert_eq!(response.batches_processed, Some(1));
    assert_eq!(response.has_more_data, Some(true));
    assert!(response.follow_up_job_id.is_none());
    assert_eq!(harness.client.call_count(CallKind::Products), 1);

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["processedCount"], json!(2));
    assert_eq!(body["requestId"], json!(response.request_id));

    let job_id = response.job_id.clone().unwrap();
    let record = harness.jobs.find(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.payload["options"]["limit"], json!(2));
    assert_eq!(record.result.unwrap()["processedCount"], json!(2));
    assert!(harness.channel.alerts().is_empty());
}

#[tokio::test]
async fn test_run_is_traceable_by_request_id() {
    let harness = Harness::new(catalog(2));

    let response = harness.trigger(&[("job", "auto-tag-products")]).await;

    let events: Vec<String> = harness
        .logs
        .find_by_correlation(&response.request_id)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.event)
        .collect();
    assert_eq!(events, vec!["trigger_received", "job_started", "job_completed"]);
}

#[tokio::test]
async fn test_requested_job_id_is_used() {
    let harness = Harness::new(catalog(2));

    let response = harness
        .trigger(&[("job", "auto-tag-products"), ("jobId", "manual-42")])
        .await;

    assert_eq!(response.job_id.as_deref(), Some("manual-42"));
    assert_ne!(response.request_id, "manual-42");
    assert!(harness.jobs.find("manual-42").await.unwrap().is_some());
}

#[tokio::test]
async fn test_finished_job_is_not_run_again() {
    let harness = Harness::new(catalog(2));
    let first = harness
        .trigger(&[("job", "inventory-analysis"), ("jobId", "manual-43")])
        .await;
    assert!(first.success);
    let before = harness.jobs.find("manual-43").await.unwrap().unwrap();

    let again = harness
        .trigger(&[("job", "inventory-analysis"), ("jobId", "manual-43"), ("limit", "1")])
        .await;

    assert!(!again.success);
    assert_eq!(again.job_id.as_deref(), Some("manual-43"));
    assert!(again.message.contains("已经结束"));
    assert_eq!(harness.client.call_count(CallKind::Products), 1);
    assert_eq!(harness.channel.titles(), vec!["重复触发已结束的任务".to_string()]);

    let after = harness.jobs.find("manual-43").await.unwrap().unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.result, before.result);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let harness = Harness::new(catalog(2));
    let credentials = TriggerCredentials {
        api_key: Some("wrong".to_string()),
        remote_ip: Some("203.0.113.9".to_string()),
        trusted_local: false,
    };

    let response = harness
        .dispatcher
        .handle_trigger(TriggerRequest::cron(credentials, params(&[("job", "auto-tag-products")])))
        .await;

    assert!(response.unauthorized);
    assert!(!response.success);
    assert_eq!(harness.jobs.len().await, 0);
    assert!(harness.client.calls().is_empty());
    assert_eq!(harness.channel.titles(), vec!["未授权的任务触发".to_string()]);
}

#[tokio::test]
async fn test_trusted_ip_and_local_sources_are_accepted() {
    let harness = Harness::new(catalog(2));
    let from_ip = TriggerCredentials {
        remote_ip: Some("10.0.0.7".to_string()),
        ..Default::default()
    };

    let by_ip = harness
        .dispatcher
        .handle_trigger(TriggerRequest::cron(from_ip, params(&[("job", "inventory-analysis")])))
        .await;
    let local = harness
        .dispatcher
        .handle_trigger(TriggerRequest {
            source: LogCategory::System,
            credentials: TriggerCredentials::local(),
            params: params(&[("job", "inventory-analysis")]),
        })
        .await;

    assert!(by_ip.success);
    assert!(local.success);
}

#[tokio::test]
async fn test_unknown_job_type_fails_without_record() {
    let harness = Harness::new(catalog(2));

    let response = harness.trigger(&[("job", "reindex-everything")]).await;

    assert!(!response.success);
    assert!(!response.unauthorized);
    assert!(response.message.contains("reindex-everything"));
    assert_eq!(harness.jobs.len().await, 0);
    assert_eq!(harness.channel.titles(), vec!["无效的任务类型".to_string()]);
}

#[tokio::test]
async fn test_invalid_options_record_failed_job() {
    let harness = Harness::new(catalog(2));

    let response = harness
        .trigger(&[("job", "auto-tag-products"), ("limit", "many")])
        .await;

    assert!(!response.success);
    let record = harness
        .jobs
        .find(response.job_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(harness.client.calls().is_empty());
}

#[tokio::test]
async fn test_full_sync_schedules_follow_up_at_product_cap() {
    let harness = Harness::new(catalog(5));

    let response = harness
        .trigger(&[
            ("job", "auto-tag-products"),
            ("limit", "2"),
            ("fullSync", "true"),
            ("maxProducts", "4"),
        ])
        .await;

    assert!(response.success);
    assert_eq!(response.processed_count, Some(4));
    assert_eq!(response.batches_processed, Some(2));
    assert_eq!(response.has_more_data, Some(true));

    let parent_id = response.job_id.clone().unwrap();
    let follow_up_id = response.follow_up_job_id.clone().unwrap();
    let follow_up = harness.jobs.find(&follow_up_id).await.unwrap().unwrap();
    assert_eq!(follow_up.status, JobStatus::Scheduled);
    assert_eq!(follow_up.payload["parentJobId"], json!(parent_id));
    assert_eq!(follow_up.payload["options"]["productCursor"], json!("cursor-4"));
    assert_eq!(follow_up.payload["options"]["fullSync"], json!(true));
}

#[tokio::test]
async fn test_full_sync_drains_small_catalog() {
    let harness = Harness::new(catalog(3));

    let response = harness
        .trigger(&[("job", "auto-tag-products"), ("limit", "2"), ("fullSync", "true")])
        .await;

    assert!(response.success);
    assert_eq!(response.processed_count, Some(3));
    assert_eq!(response.batches_processed, Some(2));
    assert_eq!(response.has_more_data, Some(false));
    assert!(response.follow_up_job_id.is_none());
    assert_eq!(harness.jobs.len().await, 1);
}

#[tokio::test]
async fn test_best_seller_on_a_later_page_keeps_its_sales() {
    let products = sample_products(4);
    let best_seller = products[2].id.clone();
    let orders = (0..6)
        .map(|i| {
            OrderBuilder::new(&format!("o{i}"))
                .with_line_item(&best_seller, 10)
                .build()
        })
        .collect();
    let harness = Harness::new(
        MockCommerceClient::new()
            .with_products(products)
            .with_orders(orders)
            .paginated(),
    );

    let response = harness
        .trigger(&[("job", "auto-tag-products"), ("limit", "2"), ("fullSync", "true")])
        .await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.batches_processed, Some(2));
    assert_eq!(harness.client.call_count(CallKind::Orders), 1);

    let tags = harness.client.product(&best_seller).unwrap().tags;
    assert!(tags.contains(&TAG_BEST_SELLER.to_string()), "{tags:?}");
    assert!(!tags.contains(&TAG_SLOW_MOVER.to_string()), "{tags:?}");
}

#[tokio::test]
async fn test_page_failure_keeps_checkpoint() {
    let harness = Harness::new(catalog(6).fail_products_call(2));

    let response = harness
        .trigger(&[("job", "auto-tag-products"), ("limit", "2"), ("fullSync", "true")])
        .await;

    assert!(!response.success);
    assert_eq!(response.batches_processed, Some(1));
    assert_eq!(response.processed_count, Some(2));

    let record = harness
        .jobs
        .find(response.job_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.unwrap().contains("products query #2 rejected"));
    let result = record.result.unwrap();
    assert_eq!(result["checkpoint"]["productCursor"], json!("cursor-2"));
    assert_eq!(result["errorType"], json!("PlatformError"));
    assert_eq!(harness.channel.titles(), vec!["任务执行失败".to_string()]);
}

#[tokio::test]
async fn test_analysis_alias_is_dispatched() {
    let harness = Harness::new(catalog(3));

    let response = harness.trigger(&[("job", "analysis")]).await;

    assert!(response.success);
    assert_eq!(response.processed_count, Some(3));
    assert_eq!(response.batches_processed, Some(1));
    assert_eq!(response.has_more_data, Some(false));
}
