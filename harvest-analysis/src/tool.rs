//! External static-analysis tool subprocess

use async_trait::async_trait;
use harvest_core::{tool_error, with_timeout, AnalysisConfig, HarvestResult};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Name of the per-class report the tool writes into its output directory
pub const CLASS_REPORT: &str = "class.csv";

/// Result of one tool invocation
#[derive(Debug)]
pub enum ToolOutcome {
    /// The tool produced a per-class report at this path
    Report(PathBuf),
    /// Clean exit but no report: the tree held nothing the tool could analyze
    NoOutput,
}

/// Runs an object-oriented metrics tool over one source tree
#[async_trait]
pub trait AnalysisTool: Send + Sync {
    async fn analyze(
        &self,
        full_name: &str,
        source_root: &Path,
        output_dir: &Path,
    ) -> HarvestResult<ToolOutcome>;
}

/// CK invoked as
/// `java -jar ck.jar <sourceRoot> <useJars> <maxFilesPerPartition> <variablesAndFields> <outputDir>`
pub struct CkTool {
    java_command: String,
    jar: PathBuf,
    use_jars: bool,
    max_files_per_partition: u32,
    variables_and_fields: bool,
    timeout_ms: u64,
}

impl CkTool {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            java_command: config.java_command.clone(),
            jar: config.ck_jar.clone(),
            use_jars: config.use_jars,
            max_files_per_partition: config.max_files_per_partition,
            variables_and_fields: config.variables_and_fields,
            timeout_ms: config.tool_timeout_secs * 1000,
        }
    }
}

#[async_trait]
impl AnalysisTool for CkTool {
    async fn analyze(
        &self,
        full_name: &str,
        source_root: &Path,
        output_dir: &Path,
    ) -> HarvestResult<ToolOutcome> {
        // The tool appends to existing reports; always start from an empty
        // output directory
        if output_dir.exists() {
            tokio::fs::remove_dir_all(output_dir).await.map_err(|e| {
                tool_error!(
                    full_name,
                    format!("Failed to clear tool output directory: {}", e),
                    "ck_tool"
                )
            })?;
        }
        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            tool_error!(
                full_name,
                format!("Failed to create tool output directory: {}", e),
                "ck_tool"
            )
        })?;

        info!(
            repo = %full_name,
            source_root = %source_root.display(),
            "Running analysis tool"
        );

        let mut cmd = Command::new(&self.java_command);
        cmd.arg("-jar")
            .arg(&self.jar)
            .arg(source_root)
            .arg(self.use_jars.to_string())
            .arg(self.max_files_per_partition.to_string())
            .arg(self.variables_and_fields.to_string())
            .arg(output_dir);
        // Dropping the future on timeout must also kill the child
        cmd.kill_on_drop(true);

        let output = with_timeout(
            cmd.output(),
            self.timeout_ms,
            &format!("analysis of {}", full_name),
        )
        .await?
        .map_err(|e| {
            tool_error!(
                full_name,
                format!("Failed to run {}: {}", self.java_command, e),
                "ck_tool"
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(tool_error!(
                full_name,
                format!("Analysis tool exited with {}", output.status),
                stderr.trim(),
                "ck_tool"
            ));
        }

        let report = output_dir.join(CLASS_REPORT);
        if report.exists() {
            debug!(repo = %full_name, report = %report.display(), "Per-class report written");
            Ok(ToolOutcome::Report(report))
        } else {
            // Clean exit without a report happens on trees with no
            // compilable classes; distinct from a tool failure
            warn!(repo = %full_name, "Tool exited cleanly but wrote no report");
            Ok(ToolOutcome::NoOutput)
        }
    }
}
