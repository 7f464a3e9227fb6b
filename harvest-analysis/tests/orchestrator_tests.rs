//! Job loop behavior: isolation, cleanup, degraded outcomes

use harvest_core::{
    acquisition_error, async_trait, AnalysisConfig, AnalysisSummary, HarvestConfig, HarvestResult,
    JobOutcome, SummarySink,
};
use harvest_analysis::{
    find_source_root, force_remove_dir_all, read_identifier_list, summarize_class_report,
    AnalysisRunner, AnalysisTool, SourceAcquirer, ToolOutcome,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

const SAMPLE_REPORT: &str = "\
file,class,type,cbo,wmc,dit,rfc,lcom,loc
src/A.java,com.a.A,class,5,10,1,20,3,100
src/B.java,com.b.B,class,1,4,3,9,1,50
src/C.java,com.c.C,class,3,7,2,12,2,30
";

fn analysis_config(work_dir: &Path) -> AnalysisConfig {
    let mut config = HarvestConfig::default().analysis;
    config.work_dir = work_dir.to_path_buf();
    config.job_delay_ms = 0;
    config
}

/// Populates the working slot like a clone would, or fails on request
struct FakeAcquirer {
    fail_for: Vec<String>,
    with_sources: bool,
    lock_metadata: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeAcquirer {
    fn new() -> Self {
        Self {
            fail_for: Vec::new(),
            with_sources: true,
            lock_metadata: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_for(names: &[&str]) -> Self {
        Self {
            fail_for: names.iter().map(|n| n.to_string()).collect(),
            ..Self::new()
        }
    }

    fn without_sources() -> Self {
        Self {
            with_sources: false,
            ..Self::new()
        }
    }

    fn locking_metadata() -> Self {
        Self {
            lock_metadata: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceAcquirer for FakeAcquirer {
    async fn acquire(&self, full_name: &str, dest: &Path) -> HarvestResult<()> {
        self.calls.lock().unwrap().push(full_name.to_string());
        if self.fail_for.iter().any(|n| n == full_name) {
            return Err(acquisition_error!(
                full_name,
                "remote hung up",
                "fake_acquirer"
            ));
        }

        let src = dest.join("src");
        fs::create_dir_all(&src)?;
        if self.with_sources {
            fs::write(src.join("Main.java"), "class Main {}")?;
        } else {
            fs::write(src.join("README.txt"), "no code here")?;
        }

        if self.lock_metadata {
            let meta = dest.join(".git").join("objects");
            fs::create_dir_all(&meta)?;
            fs::write(meta.join("pack.idx"), b"binary")?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&meta, fs::Permissions::from_mode(0o555))?;
            }
        }
        Ok(())
    }
}

/// Writes a canned per-class report, or reports no output
struct FakeTool {
    report: Option<&'static str>,
    calls: Mutex<usize>,
}

impl FakeTool {
    fn writing(report: &'static str) -> Self {
        Self {
            report: Some(report),
            calls: Mutex::new(0),
        }
    }

    fn no_output() -> Self {
        Self {
            report: None,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AnalysisTool for FakeTool {
    async fn analyze(
        &self,
        _full_name: &str,
        _source_root: &Path,
        output_dir: &Path,
    ) -> HarvestResult<ToolOutcome> {
        *self.calls.lock().unwrap() += 1;
        match self.report {
            Some(content) => {
                fs::create_dir_all(output_dir)?;
                let path = output_dir.join("class.csv");
                fs::write(&path, content)?;
                Ok(ToolOutcome::Report(path))
            }
            None => Ok(ToolOutcome::NoOutput),
        }
    }
}

#[derive(Default)]
struct MemorySink {
    rows: Mutex<Vec<AnalysisSummary>>,
}

impl MemorySink {
    fn with_existing(names: &[&str]) -> Self {
        Self {
            rows: Mutex::new(names.iter().map(|n| AnalysisSummary::degraded(n)).collect()),
        }
    }

    fn names(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.full_name.clone())
            .collect()
    }

    fn rows(&self) -> Vec<AnalysisSummary> {
        self.rows.lock().unwrap().clone()
    }
}

impl SummarySink for MemorySink {
    fn existing_identifiers(&self) -> HarvestResult<HashSet<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.full_name.clone())
            .collect())
    }

    fn append(&self, summary: &AnalysisSummary) -> HarvestResult<()> {
        self.rows.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

fn identifiers(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn failed_job_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = analysis_config(dir.path());
    let acquirer = Arc::new(FakeAcquirer::failing_for(&["bad/repo"]));
    let tool = Arc::new(FakeTool::writing(SAMPLE_REPORT));
    let runner = AnalysisRunner::with_components(&config, acquirer, tool);
    let sink = MemorySink::default();
    let interrupt = AtomicBool::new(false);

    let report = runner
        .run_all(
            &identifiers(&["good/one", "bad/repo", "good/two"]),
            &sink,
            &interrupt,
        )
        .await
        .unwrap();

    assert_eq!(report.done, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.degraded, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].full_name, "bad/repo");
    assert!(report.failures[0].reason.contains("remote hung up"));

    // Only completed jobs produce rows, in processing order
    assert_eq!(sink.names(), vec!["good/one", "good/two"]);
    assert_eq!(sink.rows()[0].cbo_median, Some(3.0));

    // The slot is clean after the run, including after the failure
    assert!(!config.clone_slot().exists());
    assert!(!config.tool_output_dir().exists());
}

#[tokio::test]
async fn tool_without_output_completes_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let config = analysis_config(dir.path());
    let runner = AnalysisRunner::with_components(
        &config,
        Arc::new(FakeAcquirer::new()),
        Arc::new(FakeTool::no_output()),
    );
    let sink = MemorySink::default();
    let interrupt = AtomicBool::new(false);

    let report = runner
        .run_all(&identifiers(&["quiet/repo"]), &sink, &interrupt)
        .await
        .unwrap();

    assert_eq!(report.done, 1);
    assert_eq!(report.degraded, 1);
    assert_eq!(report.failed, 0);
    assert!(sink.rows()[0].is_degraded());
}

#[tokio::test]
async fn job_without_source_files_never_runs_the_tool() {
    let dir = tempfile::tempdir().unwrap();
    let config = analysis_config(dir.path());
    let tool = Arc::new(FakeTool::writing(SAMPLE_REPORT));
    let runner = AnalysisRunner::with_components(
        &config,
        Arc::new(FakeAcquirer::without_sources()),
        tool.clone(),
    );

    let outcome = runner.run_job("docs/only").await;

    match outcome {
        JobOutcome::Done(summary) => assert!(summary.is_degraded()),
        JobOutcome::Failed(error) => panic!("expected a degraded summary, got {}", error),
    }
    assert_eq!(tool.calls(), 0);
}

#[tokio::test]
async fn write_protected_clone_is_still_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = analysis_config(dir.path());
    let runner = AnalysisRunner::with_components(
        &config,
        Arc::new(FakeAcquirer::locking_metadata()),
        Arc::new(FakeTool::writing(SAMPLE_REPORT)),
    );

    let outcome = runner.run_job("locked/repo").await;

    assert!(matches!(outcome, JobOutcome::Done(_)));
    assert!(!config.clone_slot().exists());
}

#[tokio::test]
async fn already_summarized_identifiers_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = analysis_config(dir.path());
    let acquirer = Arc::new(FakeAcquirer::new());
    let runner = AnalysisRunner::with_components(
        &config,
        acquirer.clone(),
        Arc::new(FakeTool::writing(SAMPLE_REPORT)),
    );
    let sink = MemorySink::with_existing(&["done/already"]);
    let interrupt = AtomicBool::new(false);

    let report = runner
        .run_all(
            &identifiers(&["done/already", "fresh/one"]),
            &sink,
            &interrupt,
        )
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.done, 1);
    assert_eq!(acquirer.calls(), vec!["fresh/one"]);
}

#[tokio::test]
async fn preset_interrupt_processes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = analysis_config(dir.path());
    let acquirer = Arc::new(FakeAcquirer::new());
    let runner = AnalysisRunner::with_components(
        &config,
        acquirer.clone(),
        Arc::new(FakeTool::writing(SAMPLE_REPORT)),
    );
    let sink = MemorySink::default();
    let interrupt = AtomicBool::new(true);

    let report = runner
        .run_all(&identifiers(&["a/a", "b/b"]), &sink, &interrupt)
        .await
        .unwrap();

    assert!(report.interrupted);
    assert_eq!(report.done, 0);
    assert!(acquirer.calls().is_empty());
}

#[test]
fn class_report_reduces_to_summary_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("class.csv");
    fs::write(&path, SAMPLE_REPORT).unwrap();

    let summary = summarize_class_report("octocat/hello-world", &path).unwrap();

    assert_eq!(summary.cbo_median, Some(3.0));
    assert_eq!(summary.cbo_mean, Some(3.0));
    assert_eq!(summary.cbo_stddev, Some(2.0));
    assert_eq!(summary.dit_median, Some(2.0));
    assert_eq!(summary.dit_mean, Some(2.0));
    assert_eq!(summary.dit_stddev, Some(1.0));
    assert_eq!(summary.lcom_median, Some(2.0));
    assert_eq!(summary.loc_total, Some(180));
    assert_eq!(summary.classes, Some(3));
}

#[test]
fn header_only_report_is_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("class.csv");
    fs::write(&path, "file,class,type,cbo,wmc,dit,rfc,lcom,loc\n").unwrap();

    let summary = summarize_class_report("empty/repo", &path).unwrap();
    assert!(summary.is_degraded());
}

#[test]
fn conventional_layout_wins_over_density() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib");
    fs::create_dir_all(&lib).unwrap();
    for i in 0..3 {
        fs::write(lib.join(format!("Lib{}.java", i)), "class L {}").unwrap();
    }
    let conventional = dir.path().join("src").join("main").join("java");
    fs::create_dir_all(&conventional).unwrap();
    fs::write(conventional.join("App.java"), "class App {}").unwrap();

    let root = find_source_root(dir.path(), "java", "src/main/java").unwrap();
    assert_eq!(root, conventional);
}

#[test]
fn densest_directory_wins_without_conventional_layout() {
    let dir = tempfile::tempdir().unwrap();
    let sparse = dir.path().join("sparse");
    let dense = dir.path().join("dense");
    fs::create_dir_all(&sparse).unwrap();
    fs::create_dir_all(&dense).unwrap();
    fs::write(sparse.join("One.java"), "class One {}").unwrap();
    for i in 0..4 {
        fs::write(dense.join(format!("Class{}.java", i)), "class C {}").unwrap();
    }

    let root = find_source_root(dir.path(), "java", "src/main/java").unwrap();
    assert_eq!(root, dense);
}

#[test]
fn hidden_directories_are_never_selected() {
    let dir = tempfile::tempdir().unwrap();
    let hidden = dir.path().join(".build").join("generated");
    fs::create_dir_all(&hidden).unwrap();
    for i in 0..5 {
        fs::write(hidden.join(format!("Gen{}.java", i)), "class G {}").unwrap();
    }
    let visible = dir.path().join("app");
    fs::create_dir_all(&visible).unwrap();
    fs::write(visible.join("App.java"), "class App {}").unwrap();

    let root = find_source_root(dir.path(), "java", "src/main/java").unwrap();
    assert_eq!(root, visible);
}

#[test]
fn tree_without_source_files_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("README.md"), "# hi").unwrap();

    assert!(find_source_root(dir.path(), "java", "src/main/java").is_none());
}

#[test]
fn force_removal_clears_write_protection() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("stale");
    let locked = target.join("locked");
    fs::create_dir_all(&locked).unwrap();
    fs::write(locked.join("pack.idx"), b"x").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
    }

    force_remove_dir_all(&target).unwrap();
    assert!(!target.exists());
}

#[test]
fn removing_a_missing_path_is_already_clean() {
    let dir = tempfile::tempdir().unwrap();
    force_remove_dir_all(&dir.path().join("never-created")).unwrap();
}

#[test]
fn identifier_list_takes_the_first_csv_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repos.csv");
    fs::write(
        &path,
        "full_name,stars\n\"octocat/hello-world\",99\nacme/widgets,5\n\nnot-an-identifier\n",
    )
    .unwrap();

    let ids = read_identifier_list(&path).unwrap();
    assert_eq!(ids, vec!["octocat/hello-world", "acme/widgets"]);
}
