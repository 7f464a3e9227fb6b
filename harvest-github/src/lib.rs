//! GitHub search API client and metadata collection loop
//!
//! `SearchClient` speaks the GraphQL search endpoint and owns the rate-limit
//! policy; `collect_metadata` drives it page by page into a durable snapshot.

pub mod client;
pub mod collector;


pub use client::SearchClient;
pub use collector::collect_metadata;
