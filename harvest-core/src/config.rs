//! Configuration management

use crate::async_utils::RetryConfig;
use crate::error::{ErrorContext, HarvestError, HarvestResult};
use crate::types::{AnalysisConfig, GithubConfig, HarvestConfig, StorageConfig};

use std::path::Path;

/// Environment variable the API credential is read from
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            github: GithubConfig {
                api_url: "https://api.github.com/graphql".to_string(),
                search_query: "language:java sort:stars-desc".to_string(),
                target_count: 100,
                page_size: 25,
                page_delay_ms: 2000,
                request_timeout_secs: 60,
                user_agent: "harvest/0.1".to_string(),
            },
            storage: StorageConfig {
                data_dir: "harvest-data".into(),
                metadata_csv: "metadata.csv".to_string(),
                metadata_json: "metadata.json".to_string(),
                summaries_csv: "summaries.csv".to_string(),
                dataset_csv: "dataset.csv".to_string(),
            },
            analysis: AnalysisConfig {
                work_dir: "harvest-work".into(),
                clone_base_url: "https://github.com".to_string(),
                clone_timeout_secs: 300,
                java_command: "java".to_string(),
                ck_jar: "ck.jar".into(),
                use_jars: false,
                max_files_per_partition: 0,
                variables_and_fields: false,
                tool_timeout_secs: 300,
                job_delay_ms: 0,
                source_language_ext: "java".to_string(),
                conventional_source_dir: "src/main/java".to_string(),
            },
            retry: RetryConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> HarvestResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HarvestError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: HarvestConfig = toml::from_str(&content).map_err(|e| HarvestError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> HarvestResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| HarvestError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| HarvestError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> HarvestResult<()> {
        if self.github.target_count == 0 {
            return Err(HarvestError::Config {
                message: "github.target_count must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set github.target_count to a positive value"),
            });
        }

        if self.github.page_size == 0 || self.github.page_size > 100 {
            return Err(HarvestError::Config {
                message: "github.page_size must be between 1 and 100".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("The search API caps page sizes at 100"),
            });
        }

        if self.github.search_query.trim().is_empty() {
            return Err(HarvestError::Config {
                message: "github.search_query must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Provide a search expression such as 'language:java'"),
            });
        }

        if self.analysis.clone_timeout_secs == 0 || self.analysis.tool_timeout_secs == 0 {
            return Err(HarvestError::Config {
                message: "analysis timeouts must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set analysis.clone_timeout_secs and analysis.tool_timeout_secs to positive values"),
            });
        }

        if self.analysis.source_language_ext.trim().is_empty() {
            return Err(HarvestError::Config {
                message: "analysis.source_language_ext must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set analysis.source_language_ext, e.g. \"java\""),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(HarvestError::Config {
                message: "retry.max_attempts must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set retry.max_attempts to a positive value"),
            });
        }

        Ok(())
    }
}

/// Read the API credential from the environment.
///
/// Called before any client is constructed so a missing token aborts the run
/// without a single network request.
pub fn github_token() -> HarvestResult<String> {
    match std::env::var(TOKEN_ENV_VAR) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(HarvestError::Config {
            message: format!("{} environment variable is not set", TOKEN_ENV_VAR),
            source: None,
            context: ErrorContext::new("config")
                .with_operation("github_token")
                .with_suggestion("Export GITHUB_TOKEN with a valid API token")
                .with_suggestion("Tokens can be created under GitHub settings > Developer settings"),
        }),
    }
}
