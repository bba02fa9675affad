use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use enricher_core::models::{LineItem, Order, Page, Product};
use enricher_core::traits::CommerceClient;
use enricher_errors::{EnricherError, EnricherResult};

use super::queries::{ORDERS_QUERY, PRODUCTS_QUERY, TAGS_ADD_MUTATION};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<N> {
    edges: Vec<Edge<N>>,
    #[serde(default)]
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct Edge<N> {
    #[serde(default)]
    cursor: Option<String>,
    node: N,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderNode {
    id: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    line_items: Option<Connection<LineItemNode>>,
}

#[derive(Debug, Deserialize)]
struct LineItemNode {
    quantity: i64,
    #[serde(default)]
    product: Option<ProductRef>,
}

#[derive(Debug, Deserialize)]
struct ProductRef {
    id: String,
}

impl From<OrderNode> for Order {
    fn from(node: OrderNode) -> Self {
        let line_items = node
            .line_items
            .map(|conn| {
                conn.edges
                    .into_iter()
                    .map(|edge| LineItem {
                        product_id: edge.node.product.map(|p| p.id),
                        quantity: edge.node.quantity,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Order {
            id: node.id,
            created_at: node.created_at,
            line_items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagsAddPayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<String>>,
    message: String,
}

/// 把连接结果转换为分页，超出请求数量时截断
///
/// 截断后下一页从最后保留的一条记录继续。
fn into_page<N, T>(connection: Connection<N>, limit: usize, map: impl Fn(N) -> T) -> Page<T> {
    let Connection {
        mut edges,
        page_info,
    } = connection;

    if edges.len() > limit {
        edges.truncate(limit);
        let end_cursor = edges.last().and_then(|edge| edge.cursor.clone());
        return Page {
            items: edges.into_iter().map(|edge| map(edge.node)).collect(),
            end_cursor,
            has_next_page: true,
        };
    }

    let end_cursor = page_info
        .end_cursor
        .or_else(|| edges.last().and_then(|edge| edge.cursor.clone()));
    Page {
        items: edges.into_iter().map(|edge| map(edge.node)).collect(),
        end_cursor,
        has_next_page: page_info.has_next_page,
    }
}

fn parse_connection<N: DeserializeOwned>(data: &Value, field: &str) -> EnricherResult<Connection<N>> {
    let raw = data
        .get(field)
        .cloned()
        .ok_or_else(|| EnricherError::platform(format!("响应缺少 {field} 字段")))?;
    Ok(serde_json::from_value(raw)?)
}

/// 商品目录读写网关
#[derive(Clone)]
pub struct CatalogGateway {
    client: Arc<dyn CommerceClient>,
}

impl CatalogGateway {
    pub fn new(client: Arc<dyn CommerceClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn CommerceClient> {
        &self.client
    }

    #[instrument(skip(self))]
    pub async fn fetch_products(&self, limit: u32, cursor: Option<&str>) -> EnricherResult<Page<Product>> {
        let data = self
            .client
            .query(PRODUCTS_QUERY, json!({ "first": limit, "after": cursor }))
            .await?;
        let connection: Connection<Product> = parse_connection(&data, "products")?;
        let page = into_page(connection, limit as usize, |product| product);
        debug!("获取商品 {} 条，has_next_page={}", page.len(), page.has_next_page);
        Ok(page)
    }

    #[instrument(skip(self))]
    pub async fn fetch_orders(
        &self,
        since: DateTime<Utc>,
        limit: u32,
        cursor: Option<&str>,
    ) -> EnricherResult<Page<Order>> {
        let filter = format!("created_at:>={}", since.format("%Y-%m-%d"));
        let data = self
            .client
            .query(
                ORDERS_QUERY,
                json!({ "first": limit, "after": cursor, "query": filter }),
            )
            .await?;
        let connection: Connection<OrderNode> = parse_connection(&data, "orders")?;
        let page = into_page(connection, limit as usize, Order::from);
        debug!("获取订单 {} 条，has_next_page={}", page.len(), page.has_next_page);
        Ok(page)
    }

    /// 为商品追加标签，平台返回的 `userErrors` 视为失败
    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    pub async fn add_tags(&self, product_id: &str, tags: &[String]) -> EnricherResult<()> {
        if tags.is_empty() {
            return Ok(());
        }

        let data = self
            .client
            .query(TAGS_ADD_MUTATION, json!({ "id": product_id, "tags": tags }))
            .await?;
        let payload: TagsAddPayload = match data.get("tagsAdd") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => return Err(EnricherError::platform("响应缺少 tagsAdd 字段")),
        };

        if !payload.user_errors.is_empty() {
            let message = payload
                .user_errors
                .iter()
                .map(|e| match &e.field {
                    Some(field) => format!("{}: {}", field.join("."), e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EnricherError::platform(message));
        }

        Ok(())
    }
}
