//! # enricher-infrastructure
//!
//! Concrete adapters for the ports defined in `enricher-core`:
//! cache stores and the cache layer, SQLite / in-memory bookkeeping stores,
//! and the commerce platform client.

pub mod cache;
pub mod commerce;
pub mod database;

pub use cache::{CacheLayer, CachePolicy, CacheStats, InMemoryCacheStore, RedisCacheStore};
pub use commerce::{CatalogGateway, GraphqlCommerceClient};
pub use database::{DatabaseManager, Stores};
