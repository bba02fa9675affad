//! Commerce platform access
//!
//! [`GraphqlCommerceClient`] is the transport; [`CatalogGateway`] turns the
//! raw `query(document, variables)` contract into typed catalog pages and
//! tag writes.

pub mod client;
pub mod gateway;
pub mod queries;

pub use client::GraphqlCommerceClient;
pub use gateway::CatalogGateway;
