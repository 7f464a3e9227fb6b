//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and the
//! retry/skip/abort classification the run loops match on

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type HarvestResult<T> = Result<T, HarvestError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the harvest pipeline
///
/// Variants map onto the run policies: `Config`/`Auth` abort before or during
/// startup, `RateLimited` is slept on and the same request re-issued,
/// `Network`/`Timeout` get bounded retries, `NotFound` skips the item, and the
/// per-job variants (`Acquisition`, `Tool`) fail a single job without
/// stopping the batch. `Cleanup` is only ever reported as a warning.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        context: ErrorContext,
    },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    #[error("Acquisition failed for {repo}: {message}")]
    Acquisition {
        repo: String,
        message: String,
        /// Stderr of the failed subprocess, kept for the run report
        diagnostic: Option<String>,
        context: ErrorContext,
    },

    #[error("Analysis tool failed for {repo}: {message}")]
    Tool {
        repo: String,
        message: String,
        /// Stderr of the failed subprocess, kept for the run report
        diagnostic: Option<String>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Cleanup failed for {path}: {message}")]
    Cleanup {
        path: String,
        message: String,
        context: ErrorContext,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tabular data error: {0}")]
    Csv(#[from] csv::Error),
}

impl HarvestError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            HarvestError::Config { context, .. } => Some(context),
            HarvestError::Auth { context, .. } => Some(context),
            HarvestError::RateLimited { context, .. } => Some(context),
            HarvestError::Network { context, .. } => Some(context),
            HarvestError::NotFound { context, .. } => Some(context),
            HarvestError::Acquisition { context, .. } => Some(context),
            HarvestError::Tool { context, .. } => Some(context),
            HarvestError::Timeout { context, .. } => Some(context),
            HarvestError::Storage { context, .. } => Some(context),
            HarvestError::Cleanup { context, .. } => Some(context),
            HarvestError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Check if the error can be retried at all (transient or rate-limited)
    pub fn is_recoverable(&self) -> bool {
        match self {
            HarvestError::Network { .. } => true,
            HarvestError::Timeout { .. } => true,
            HarvestError::RateLimited { .. } => true,
            HarvestError::Auth { .. } => false,
            HarvestError::Config { .. } => false,
            HarvestError::NotFound { .. } => false,
            _ => false,
        }
    }

    /// Transient errors are the only ones the backoff helper re-attempts.
    /// Rate limiting is not transient: the caller sleeps until the
    /// server-advertised reset and re-issues the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::Network { .. } | HarvestError::Timeout { .. }
        )
    }

    /// Errors that must stop the whole run, not just the current item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::Config { .. } | HarvestError::Auth { .. } | HarvestError::Storage { .. }
        )
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            HarvestError::Network { .. } => Some(5000),
            HarvestError::Timeout { .. } => Some(5000),
            HarvestError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            HarvestError::Config { .. } | HarvestError::Auth { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or authentication error"
                );
            }
            HarvestError::Network { .. }
            | HarvestError::Timeout { .. }
            | HarvestError::RateLimited { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Network-level error (may be recoverable)"
                );
            }
            HarvestError::Cleanup { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Cleanup failure (run continues)"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::HarvestError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'harvest config --init' to create a default config"),
        }
    };
}

#[macro_export]
macro_rules! not_found_error {
    ($resource:expr, $component:expr) => {
        $crate::HarvestError::NotFound {
            resource: $resource.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Verify the repository identifier or URL")
                .with_suggestion("Check if the resource exists and is accessible"),
        }
    };
}

#[macro_export]
macro_rules! acquisition_error {
    ($repo:expr, $msg:expr, $component:expr) => {
        $crate::HarvestError::Acquisition {
            repo: $repo.to_string(),
            message: $msg.to_string(),
            diagnostic: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the repository still exists and is public")
                .with_suggestion("Verify network connectivity to the code host"),
        }
    };
    ($repo:expr, $msg:expr, $diagnostic:expr, $component:expr) => {
        $crate::HarvestError::Acquisition {
            repo: $repo.to_string(),
            message: $msg.to_string(),
            diagnostic: Some($diagnostic.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the repository still exists and is public")
                .with_suggestion("Verify network connectivity to the code host"),
        }
    };
}

#[macro_export]
macro_rules! tool_error {
    ($repo:expr, $msg:expr, $component:expr) => {
        $crate::HarvestError::Tool {
            repo: $repo.to_string(),
            message: $msg.to_string(),
            diagnostic: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the analysis tool jar path is correct")
                .with_suggestion("Verify that a Java runtime is installed"),
        }
    };
    ($repo:expr, $msg:expr, $diagnostic:expr, $component:expr) => {
        $crate::HarvestError::Tool {
            repo: $repo.to_string(),
            message: $msg.to_string(),
            diagnostic: Some($diagnostic.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the analysis tool jar path is correct")
                .with_suggestion("Verify that a Java runtime is installed"),
        }
    };
}
