//! Durable storage for the harvesting pipeline
//!
//! Snapshots of the metadata collection loop, the per-job summary table and
//! the final merged dataset all live as plain files under one data directory,
//! so every stage can be re-run and resumed independently.

pub mod aggregate;
pub mod collection;
pub mod summaries;

pub use aggregate::{aggregate, aggregate_at, write_dataset, AggregateReport};
pub use collection::MetadataStore;
pub use summaries::SummaryStore;
