//! Source-tree acquisition via shallow git clone

use async_trait::async_trait;
use harvest_core::{acquisition_error, with_timeout, AnalysisConfig, HarvestResult};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

/// Obtains a local copy of a repository's source tree
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    /// Place a shallow copy of `full_name`'s source tree at `dest`.
    ///
    /// `dest` must not exist yet; the caller owns slot cleanup before and
    /// after the job.
    async fn acquire(&self, full_name: &str, dest: &Path) -> HarvestResult<()>;
}

/// Shallow `git clone` acquirer
pub struct GitAcquirer {
    base_url: String,
    timeout_ms: u64,
}

impl GitAcquirer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            base_url: config.clone_base_url.clone(),
            timeout_ms: config.clone_timeout_secs * 1000,
        }
    }

    /// Build the clone URL for an `owner/name` identifier
    pub fn clone_url(&self, full_name: &str) -> HarvestResult<Url> {
        let raw = format!("{}/{}.git", self.base_url.trim_end_matches('/'), full_name);
        Url::parse(&raw).map_err(|e| {
            acquisition_error!(
                full_name,
                format!("Invalid clone URL {}: {}", raw, e),
                "git_acquirer"
            )
        })
    }
}

#[async_trait]
impl SourceAcquirer for GitAcquirer {
    async fn acquire(&self, full_name: &str, dest: &Path) -> HarvestResult<()> {
        let url = self.clone_url(full_name)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                acquisition_error!(
                    full_name,
                    format!("Failed to create working directory: {}", e),
                    "git_acquirer"
                )
            })?;
        }

        info!(repo = %full_name, dest = %dest.display(), "Cloning repository");

        let mut cmd = Command::new("git");
        cmd.arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--single-branch")
            .arg(url.as_str())
            .arg(dest);
        // Dropping the future on timeout must also kill the child
        cmd.kill_on_drop(true);

        let output = with_timeout(
            cmd.output(),
            self.timeout_ms,
            &format!("clone of {}", full_name),
        )
        .await?
        .map_err(|e| {
            acquisition_error!(full_name, format!("Failed to run git: {}", e), "git_acquirer")
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(acquisition_error!(
                full_name,
                format!("git clone exited with {}", output.status),
                stderr.trim(),
                "git_acquirer"
            ));
        }

        debug!(repo = %full_name, "Clone finished");
        Ok(())
    }
}
