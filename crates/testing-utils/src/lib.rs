//! # Enricher Testing Utils
//!
//! Shared test doubles for the enrichment workspace.
//!
//! ## Features
//!
//! - **Mock platform**: [`MockCommerceClient`] answers the products, orders
//!   and tagsAdd documents from an in-memory catalog, records every call and
//!   supports failure injection
//! - **Failing stores**: cache and job stores that fail on demand
//! - **Recording channel**: captures delivered alerts
//! - **Builders**: products and orders with sensible defaults
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! enricher-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
