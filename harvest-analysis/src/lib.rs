//! Acquisition and analysis pipeline
//!
//! Clones repositories one at a time into an exclusive working slot, runs the
//! CK static-analysis tool over the best source root, and reduces the
//! per-class output to one summary row per repository. Each job is isolated:
//! a failure marks that job failed and the loop moves on, and the working
//! slot is cleaned up whatever the outcome.

pub mod acquire;
pub mod cleanup;
pub mod orchestrator;
pub mod source_root;
pub mod summary;
pub mod tool;

pub use acquire::{GitAcquirer, SourceAcquirer};
pub use cleanup::force_remove_dir_all;
pub use orchestrator::{read_identifier_list, AnalysisRunner};
pub use source_root::find_source_root;
pub use summary::summarize_class_report;
pub use tool::{AnalysisTool, CkTool, ToolOutcome};
