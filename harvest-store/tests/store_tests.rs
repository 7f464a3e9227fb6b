//! Storage and aggregation behavior over real files

use chrono::{Duration, TimeZone, Utc};
use harvest_core::{
    AnalysisSummary, CollectionState, HarvestConfig, RepositoryRecord, SnapshotStore,
    StorageConfig, SummarySink,
};
use harvest_store::{aggregate_at, write_dataset, MetadataStore, SummaryStore};
use std::fs;
use std::path::Path;

const DATASET_HEADER: &str = "full_name,stars,age_years,primary_language,releases,\
merged_pull_requests,total_issues,closed_issues_pct,cbo_median,cbo_mean,cbo_stddev,\
dit_median,dit_mean,dit_stddev,lcom_median,lcom_mean,lcom_stddev,loc_total,classes";

fn storage_config(dir: &Path) -> StorageConfig {
    let mut config = HarvestConfig::default().storage;
    config.data_dir = dir.to_path_buf();
    config
}

fn record(full_name: &str) -> RepositoryRecord {
    RepositoryRecord {
        full_name: full_name.to_string(),
        stars: 321,
        created_at: Utc.with_ymd_and_hms(2018, 5, 20, 10, 0, 0).unwrap(),
        pushed_at: Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap(),
        primary_language: Some("Java".to_string()),
        releases: Some(7),
        merged_pull_requests: 42,
        total_issues: 50,
        closed_issues: 40,
    }
}

fn summary(full_name: &str) -> AnalysisSummary {
    AnalysisSummary {
        full_name: full_name.to_string(),
        cbo_median: Some(4.0),
        cbo_mean: Some(5.2),
        cbo_stddev: Some(1.3),
        dit_median: Some(2.0),
        dit_mean: Some(2.4),
        dit_stddev: Some(0.8),
        lcom_median: Some(10.0),
        lcom_mean: Some(14.6),
        lcom_stddev: Some(6.1),
        loc_total: Some(125_000),
        classes: Some(840),
    }
}

#[test]
fn snapshot_round_trips_records_and_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(&storage_config(dir.path())).unwrap();

    let mut state = CollectionState::default();
    state.append(vec![record("octocat/hello-world"), record("acme/widgets")]);
    state.cursor = Some("c-42".to_string());
    store.snapshot(&state).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.records, state.records);
    assert_eq!(loaded.cursor.as_deref(), Some("c-42"));
}

#[test]
fn empty_directory_loads_an_empty_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(&storage_config(dir.path())).unwrap();

    let loaded = store.load().unwrap();
    assert!(loaded.is_empty());
    assert!(loaded.cursor.is_none());
}

#[test]
fn load_prefers_the_tabular_snapshot_for_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = storage_config(dir.path());
    let store = MetadataStore::new(&config).unwrap();

    let mut state = CollectionState::default();
    state.append(vec![record("octocat/hello-world"), record("acme/widgets")]);
    store.snapshot(&state).unwrap();

    // A diverged structured snapshot contributes only its cursor
    let mut divergent = CollectionState::default();
    divergent.append(vec![record("ghost/ghost")]);
    divergent.cursor = Some("c-json".to_string());
    fs::write(
        config.metadata_json_path(),
        serde_json::to_string_pretty(&divergent).unwrap(),
    )
    .unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(loaded.contains("octocat/hello-world"));
    assert!(!loaded.contains("ghost/ghost"));
    assert_eq!(loaded.cursor.as_deref(), Some("c-json"));
}

#[test]
fn load_falls_back_to_the_structured_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = storage_config(dir.path());
    let store = MetadataStore::new(&config).unwrap();

    let mut state = CollectionState::default();
    state.append(vec![record("octocat/hello-world")]);
    state.cursor = Some("c-7".to_string());
    store.snapshot(&state).unwrap();
    fs::remove_file(config.metadata_csv_path()).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.cursor.as_deref(), Some("c-7"));
}

#[test]
fn load_drops_duplicate_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(&storage_config(dir.path())).unwrap();

    // A torn write can leave the same identifier twice; build such a state
    // directly, bypassing the append guard
    let state = CollectionState {
        cursor: None,
        records: vec![
            record("octocat/hello-world"),
            record("acme/widgets"),
            record("octocat/hello-world"),
        ],
    };
    store.snapshot(&state).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 2);
}

#[test]
fn unreadable_structured_snapshot_only_costs_the_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let config = storage_config(dir.path());
    let store = MetadataStore::new(&config).unwrap();

    let mut state = CollectionState::default();
    state.append(vec![record("octocat/hello-world")]);
    state.cursor = Some("c-9".to_string());
    store.snapshot(&state).unwrap();
    fs::write(config.metadata_json_path(), "{ not json").unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(loaded.cursor.is_none());
}

#[test]
fn summary_append_writes_the_header_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = storage_config(dir.path());
    let store = SummaryStore::new(&config).unwrap();

    store.append(&summary("octocat/hello-world")).unwrap();
    store.append(&summary("acme/widgets")).unwrap();

    let content = fs::read_to_string(config.summaries_csv_path()).unwrap();
    let header_lines = content
        .lines()
        .filter(|line| line.starts_with("full_name"))
        .count();
    assert_eq!(header_lines, 1);
    assert_eq!(content.lines().count(), 3);
}

#[test]
fn summary_append_never_duplicates_an_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let store = SummaryStore::new(&storage_config(dir.path())).unwrap();

    store.append(&summary("octocat/hello-world")).unwrap();
    store.append(&summary("octocat/hello-world")).unwrap();

    assert_eq!(store.load().unwrap().len(), 1);
    assert!(store
        .existing_identifiers()
        .unwrap()
        .contains("octocat/hello-world"));
}

#[test]
fn summary_rows_round_trip_including_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let store = SummaryStore::new(&storage_config(dir.path())).unwrap();

    let full = summary("octocat/hello-world");
    let degraded = AnalysisSummary::degraded("empty/repo");
    store.append(&full).unwrap();
    store.append(&degraded).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0], full);
    assert_eq!(loaded[1], degraded);
    assert!(loaded[1].is_degraded());
}

#[test]
fn aggregate_keeps_only_matched_rows_and_counts_the_rest() {
    let records: Vec<RepositoryRecord> =
        (0..10).map(|i| record(&format!("owner/repo-{}", i))).collect();
    let mut summaries: Vec<AnalysisSummary> =
        (0..7).map(|i| summary(&format!("owner/repo-{}", i))).collect();
    summaries.push(summary("ghost/ghost"));

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let (rows, report) = aggregate_at(&records, &summaries, now);

    assert_eq!(rows.len(), 7);
    assert_eq!(report.rows, 7);
    assert_eq!(report.metadata_dropped, 3);
    assert_eq!(report.summaries_dropped, 1);
    // Metadata order is preserved
    assert_eq!(rows[0].full_name, "owner/repo-0");
    assert_eq!(rows[6].full_name, "owner/repo-6");
}

#[test]
fn derived_fields_follow_the_join_rules() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let mut aged = record("owner/aged");
    aged.created_at = now - Duration::hours(730 * 24 + 12);

    let mut no_issues = record("owner/no-issues");
    no_issues.total_issues = 0;
    no_issues.closed_issues = 0;

    let mut thirds = record("owner/thirds");
    thirds.total_issues = 3;
    thirds.closed_issues = 1;

    let records = vec![aged, no_issues, thirds];
    let summaries = vec![
        summary("owner/aged"),
        summary("owner/no-issues"),
        summary("owner/thirds"),
    ];
    let (rows, _) = aggregate_at(&records, &summaries, now);

    // 730.5 days against a 365.25-day year
    assert_eq!(rows[0].age_years, 2.0);
    assert_eq!(rows[0].closed_issues_pct, 80.0);
    // No issues at all counts as fully closed
    assert_eq!(rows[1].closed_issues_pct, 100.0);
    assert_eq!(rows[2].closed_issues_pct, 33.33);
}

#[test]
fn dataset_is_written_in_one_pass_with_a_single_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.csv");

    let records = vec![record("octocat/hello-world"), record("acme/widgets")];
    let summaries = vec![summary("octocat/hello-world"), summary("acme/widgets")];
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let (rows, _) = aggregate_at(&records, &summaries, now);

    write_dataset(&path, &rows).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(DATASET_HEADER));
    assert_eq!(content.lines().count(), 3);
}
