//! Harvest Core - shared data structures and trait definitions
//!
//! This crate defines the data model, error handling, configuration, and
//! async utilities used by every stage of the harvesting pipeline

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
