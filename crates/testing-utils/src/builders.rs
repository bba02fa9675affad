//! Test data builders for catalog entities

use chrono::{Duration, Utc};

use enricher_core::models::{LineItem, Order, Product};

/// Builder for creating test Product entities
pub struct ProductBuilder {
    product: Product,
}

impl ProductBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            product: Product {
                id: id.to_string(),
                title: format!("Product {id}"),
                product_type: Some("Apparel".to_string()),
                vendor: Some("Acme".to_string()),
                tags: Vec::new(),
                total_inventory: 20,
                created_at: Some(Utc::now() - Duration::days(365)),
            },
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.product.title = title.to_string();
        self
    }

    pub fn with_inventory(mut self, total_inventory: i64) -> Self {
        self.product.total_inventory = total_inventory;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.product.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn created_days_ago(mut self, days: i64) -> Self {
        self.product.created_at = Some(Utc::now() - Duration::days(days));
        self
    }

    pub fn build(self) -> Product {
        self.product
    }
}

/// Builder for creating test Order entities
pub struct OrderBuilder {
    order: Order,
}

impl OrderBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            order: Order {
                id: id.to_string(),
                created_at: Utc::now() - Duration::days(1),
                line_items: Vec::new(),
            },
        }
    }

    pub fn created_days_ago(mut self, days: i64) -> Self {
        self.order.created_at = Utc::now() - Duration::days(days);
        self
    }

    pub fn with_line_item(mut self, product_id: &str, quantity: i64) -> Self {
        self.order.line_items.push(LineItem {
            product_id: Some(product_id.to_string()),
            quantity,
        });
        self
    }

    pub fn build(self) -> Order {
        self.order
    }
}

/// `count` products with ids `gid://shopify/Product/1..=count`
pub fn sample_products(count: usize) -> Vec<Product> {
    (1..=count)
        .map(|i| ProductBuilder::new(&format!("gid://shopify/Product/{i}")).build())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_builder_defaults() {
        let product = ProductBuilder::new("p1").with_inventory(0).with_tags(&["sale"]).build();
        assert_eq!(product.id, "p1");
        assert_eq!(product.total_inventory, 0);
        assert!(product.has_tag("SALE"));
    }

    #[test]
    fn test_order_builder_line_items() {
        let order = OrderBuilder::new("o1")
            .with_line_item("p1", 2)
            .with_line_item("p2", 1)
            .build();
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.line_items[0].product_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_sample_products() {
        let products = sample_products(3);
        assert_eq!(products.len(), 3);
        assert_eq!(products[2].id, "gid://shopify/Product/3");
    }
}
