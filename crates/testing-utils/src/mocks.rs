//! Mock implementations of the platform, store and channel ports
//!
//! Everything here is in-memory and deterministic so tests can assert on
//! exact call counts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use enricher_core::models::{AlertRecord, JobRecord, Order, Product};
use enricher_core::traits::{CacheStore, CommerceClient, JobStore};
use enricher_errors::{EnricherError, EnricherResult};
use enricher_infrastructure::database::InMemoryJobStore;
use enricher_observability::NotificationChannel;

/// Which GraphQL document a recorded call carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Products,
    Orders,
    TagsAdd,
    Other,
}

impl CallKind {
    fn of(document: &str) -> Self {
        if document.contains("tagsAdd(") {
            CallKind::TagsAdd
        } else if document.contains("orders(") {
            CallKind::Orders
        } else if document.contains("products(") {
            CallKind::Products
        } else {
            CallKind::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub variables: Value,
}

#[derive(Debug, Default)]
struct MockState {
    products: Vec<Product>,
    orders: Vec<Order>,
    calls: Vec<RecordedCall>,
    /// 1-based products-call numbers that fail
    failing_product_calls: Vec<usize>,
    failing_tag_products: Vec<String>,
    transient_failures: usize,
}

/// In-memory commerce platform
///
/// Unpaginated by default: the page size (`first`) is ignored and every
/// remaining item after `after` is returned, mimicking a platform that
/// over-delivers. Call [`MockCommerceClient::paginated`] to honor `first`.
#[derive(Debug, Clone, Default)]
pub struct MockCommerceClient {
    state: Arc<Mutex<MockState>>,
    paginate: bool,
}

impl MockCommerceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(self, products: Vec<Product>) -> Self {
        self.state.lock().unwrap().products = products;
        self
    }

    pub fn with_orders(self, orders: Vec<Order>) -> Self {
        self.state.lock().unwrap().orders = orders;
        self
    }

    pub fn paginated(mut self) -> Self {
        self.paginate = true;
        self
    }

    /// The `call`-th products query (1-based) fails with a platform error
    pub fn fail_products_call(self, call: usize) -> Self {
        self.state.lock().unwrap().failing_product_calls.push(call);
        self
    }

    /// tagsAdd for `product_id` is rejected with a user error
    pub fn fail_tags_for(self, product_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_tag_products
            .push(product_id.to_string());
        self
    }

    /// The next `count` calls of any kind fail with a network error
    pub fn fail_transiently(self, count: usize) -> Self {
        self.state.lock().unwrap().transient_failures = count;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.kind == kind)
            .count()
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.state
            .lock()
            .unwrap()
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Product ids that received at least one tagsAdd call, in call order
    pub fn tagged_products(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.kind == CallKind::TagsAdd)
            .filter_map(|c| c.variables.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    fn page<T, F>(items: &[T], variables: &Value, prefix: &str, paginate: bool, node: F) -> Value
    where
        F: Fn(&T) -> Value,
    {
        let start = variables
            .get("after")
            .and_then(Value::as_str)
            .and_then(|cursor| cursor.strip_prefix(prefix))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0)
            .min(items.len());
        let first = variables
            .get("first")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(items.len());
        let end = if paginate {
            (start + first).min(items.len())
        } else {
            items.len()
        };

        let edges: Vec<Value> = items[start..end]
            .iter()
            .enumerate()
            .map(|(offset, item)| {
                json!({
                    "cursor": format!("{prefix}{}", start + offset + 1),
                    "node": node(item),
                })
            })
            .collect();

        json!({
            "edges": edges,
            "pageInfo": {
                "hasNextPage": end < items.len(),
                "endCursor": if end > start { Some(format!("{prefix}{end}")) } else { None },
            }
        })
    }

    fn order_node(order: &Order) -> Value {
        let line_items: Vec<Value> = order
            .line_items
            .iter()
            .map(|item| {
                json!({
                    "node": {
                        "quantity": item.quantity,
                        "product": item.product_id.as_ref().map(|id| json!({ "id": id })),
                    }
                })
            })
            .collect();
        json!({
            "id": order.id,
            "createdAt": order.created_at,
            "lineItems": { "edges": line_items },
        })
    }
}

#[async_trait]
impl CommerceClient for MockCommerceClient {
    async fn query(&self, document: &str, variables: Value) -> EnricherResult<Value> {
        let kind = CallKind::of(document);
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            kind,
            variables: variables.clone(),
        });

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(EnricherError::network("connection reset by peer"));
        }

        match kind {
            CallKind::Products => {
                let call_number = state
                    .calls
                    .iter()
                    .filter(|c| c.kind == CallKind::Products)
                    .count();
                if state.failing_product_calls.contains(&call_number) {
                    return Err(EnricherError::platform(format!(
                        "products query #{call_number} rejected"
                    )));
                }
                let connection = Self::page(&state.products, &variables, "cursor-", self.paginate, |p| {
                    serde_json::to_value(p).unwrap_or(Value::Null)
                });
                Ok(json!({ "products": connection }))
            }
            CallKind::Orders => {
                let connection = Self::page(
                    &state.orders,
                    &variables,
                    "order-cursor-",
                    self.paginate,
                    Self::order_node,
                );
                Ok(json!({ "orders": connection }))
            }
            CallKind::TagsAdd => {
                let id = variables
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if state.failing_tag_products.contains(&id) {
                    return Ok(json!({
                        "tagsAdd": {
                            "node": null,
                            "userErrors": [{ "field": ["tags"], "message": "tag rejected" }]
                        }
                    }));
                }
                let tags: Vec<String> = variables
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|tags| {
                        tags.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if let Some(product) = state.products.iter_mut().find(|p| p.id == id) {
                    for tag in tags {
                        if !product.has_tag(&tag) {
                            product.tags.push(tag);
                        }
                    }
                }
                Ok(json!({ "tagsAdd": { "node": { "id": id }, "userErrors": [] } }))
            }
            CallKind::Other => Err(EnricherError::platform("unsupported document")),
        }
    }
}

/// Cache store whose every operation fails with a network error
#[derive(Debug, Default)]
pub struct FailingCacheStore {
    calls: AtomicUsize,
}

impl FailingCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> EnricherResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EnricherError::network("cache connection refused"))
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> EnricherResult<Option<String>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> EnricherResult<()> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> EnricherResult<bool> {
        self.fail()
    }

    async fn delete_pattern(&self, _pattern: &str) -> EnricherResult<usize> {
        self.fail()
    }

    async fn health_check(&self) -> EnricherResult<bool> {
        self.fail()
    }
}

/// Job store that fails its first `failures` calls, then delegates
pub struct FlakyJobStore {
    inner: InMemoryJobStore,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyJobStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryJobStore::new(),
            failures_remaining: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryJobStore {
        &self.inner
    }

    fn check(&self) -> EnricherResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(EnricherError::database_error("job store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn find(&self, id: &str) -> EnricherResult<Option<JobRecord>> {
        self.check()?;
        self.inner.find(id).await
    }

    async fn create(&self, record: &JobRecord) -> EnricherResult<JobRecord> {
        self.check()?;
        self.inner.create(record).await
    }

    async fn upsert(&self, record: &JobRecord) -> EnricherResult<JobRecord> {
        self.check()?;
        self.inner.upsert(record).await
    }
}

/// Notification channel that keeps every alert it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    alerts: Arc<Mutex<Vec<AlertRecord>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.title.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_alert(&self, alert: &AlertRecord) -> EnricherResult<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Current tags of every product, keyed by id
pub fn tags_by_product(client: &MockCommerceClient) -> HashMap<String, Vec<String>> {
    client
        .state
        .lock()
        .unwrap()
        .products
        .iter()
        .map(|p| (p.id.clone(), p.tags.clone()))
        .collect()
}
