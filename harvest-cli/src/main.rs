//! Harvest CLI - command-line interface for the harvesting pipeline
//!
//! Drives the three pipeline stages in order: metadata collection from the
//! search API, per-repository clone-and-analyze jobs, and the final join
//! into one dataset

use clap::{Parser, Subcommand};
use harvest_analysis::{read_identifier_list, AnalysisRunner};
use harvest_core::{
    config_error, github_token, init_logging, log_operation_error, log_operation_start,
    log_operation_success, HarvestConfig, HarvestResult, LoggingConfig, SnapshotStore,
};
use harvest_github::{collect_metadata, SearchClient};
use harvest_store::{aggregate, write_dataset, MetadataStore, SummaryStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Collect GitHub repository metadata and class-level code metrics")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect repository metadata from the search API
    Collect {
        /// Number of repositories to collect
        #[arg(short, long)]
        target: Option<usize>,

        /// Repositories per search page (1-100)
        #[arg(long)]
        page_size: Option<u32>,

        /// Search query, e.g. "language:java sort:stars-desc"
        #[arg(short, long)]
        query: Option<String>,

        /// Directory for collected data
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Clone collected repositories and compute class-level metrics
    Analyze {
        /// Identifier list file: one owner/name per line, or a CSV whose
        /// first column is the identifier. Defaults to the collected metadata.
        #[arg(short, long)]
        list: Option<PathBuf>,

        /// Analyze at most this many repositories
        #[arg(long)]
        limit: Option<usize>,

        /// Scratch directory for clones and tool output
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Directory for collected data
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Join metadata and analysis summaries into the final dataset
    Aggregate {
        /// Output CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for collected data
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> HarvestResult<()> {
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::default();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }

    init_logging(&logging_config).map_err(|e| harvest_core::HarvestError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: harvest_core::ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check logging configuration"),
    })?;

    info!("Starting harvest v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(cli.config.as_ref()).await?;

    match cli.command {
        Commands::Collect {
            target,
            page_size,
            query,
            data_dir,
        } => {
            if let Some(target) = target {
                config.github.target_count = target;
            }
            if let Some(page_size) = page_size {
                config.github.page_size = page_size;
            }
            if let Some(query) = query {
                config.github.search_query = query;
            }
            if let Some(data_dir) = data_dir {
                config.storage.data_dir = data_dir;
            }
            config.validate()?;
            handle_collect(&config).await?;
        }
        Commands::Analyze {
            list,
            limit,
            work_dir,
            data_dir,
        } => {
            if let Some(work_dir) = work_dir {
                config.analysis.work_dir = work_dir;
            }
            if let Some(data_dir) = data_dir {
                config.storage.data_dir = data_dir;
            }
            config.validate()?;
            handle_analyze(list.as_ref(), limit, &config).await?;
        }
        Commands::Aggregate { output, data_dir } => {
            if let Some(data_dir) = data_dir {
                config.storage.data_dir = data_dir;
            }
            config.validate()?;
            handle_aggregate(output.as_ref(), &config).await?;
        }
        Commands::Config {
            show,
            init,
            validate,
        } => {
            handle_config(show, init, validate, cli.config.as_ref()).await?;
        }
    }

    Ok(())
}

async fn load_config(config_path: Option<&PathBuf>) -> HarvestResult<HarvestConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        HarvestConfig::from_file(path)
    } else {
        // Try to load from default locations
        let default_paths = [
            dirs::config_dir().map(|d| d.join("harvest").join("config.toml")),
            dirs::home_dir().map(|d| d.join(".harvest").join("config.toml")),
            Some(PathBuf::from("harvest.toml")),
        ];

        for path_opt in default_paths.iter() {
            if let Some(path) = path_opt {
                if path.exists() {
                    info!("Loading configuration from {:?}", path);
                    return HarvestConfig::from_file(path);
                }
            }
        }

        info!("No configuration file found, using defaults");
        Ok(HarvestConfig::default())
    }
}

/// Ctrl-C sets a flag that the pipeline loops check between units of work,
/// so the in-flight page or job always finishes and persists first
fn install_interrupt_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current step before stopping");
            handler_flag.store(true, Ordering::Relaxed);
        }
    });
    flag
}

async fn handle_collect(config: &HarvestConfig) -> HarvestResult<()> {
    log_operation_start!("collect_metadata", target = config.github.target_count);

    // A missing token should fail before any store is touched
    let token = github_token()?;
    let client = SearchClient::new(&config.github, &token, config.retry.clone())?;
    let store = MetadataStore::new(&config.storage)?;
    let interrupt = install_interrupt_handler();

    let state = collect_metadata(&client, &store, config, &interrupt)
        .await
        .map_err(|e| {
            log_operation_error!("collect_metadata", e);
            e
        })?;

    log_operation_success!("collect_metadata", collected = state.len());
    println!("✅ Collected {} repositories", state.len());
    println!(
        "📁 Metadata written to {:?}",
        config.storage.metadata_csv_path()
    );
    Ok(())
}

async fn handle_analyze(
    list: Option<&PathBuf>,
    limit: Option<usize>,
    config: &HarvestConfig,
) -> HarvestResult<()> {
    let mut identifiers: Vec<String> = match list {
        Some(path) => read_identifier_list(path)?,
        None => {
            let store = MetadataStore::new(&config.storage)?;
            let state = store.load()?;
            state.records.into_iter().map(|r| r.full_name).collect()
        }
    };
    if identifiers.is_empty() {
        return Err(config_error!(
            "No repositories to analyze; run 'harvest collect' first or pass --list",
            "cli"
        ));
    }
    if let Some(limit) = limit {
        identifiers.truncate(limit);
    }

    log_operation_start!("analyze_repositories", jobs = identifiers.len());

    let runner = AnalysisRunner::new(&config.analysis);
    let sink = SummaryStore::new(&config.storage)?;
    let interrupt = install_interrupt_handler();

    let report = runner
        .run_all(&identifiers, &sink, &interrupt)
        .await
        .map_err(|e| {
            log_operation_error!("analyze_repositories", e);
            e
        })?;

    log_operation_success!(
        "analyze_repositories",
        done = report.done,
        failed = report.failed
    );
    println!("📊 {}", report.summary());
    for failure in &report.failures {
        println!("⚠️  {}: {}", failure.full_name, failure.reason);
    }
    println!(
        "📁 Summaries written to {:?}",
        config.storage.summaries_csv_path()
    );
    Ok(())
}

async fn handle_aggregate(output: Option<&PathBuf>, config: &HarvestConfig) -> HarvestResult<()> {
    log_operation_start!("aggregate_dataset");

    let metadata = MetadataStore::new(&config.storage)?;
    let state = metadata.load()?;
    if state.is_empty() {
        return Err(config_error!(
            "No collected metadata to aggregate; run 'harvest collect' first",
            "cli"
        ));
    }
    let summaries = SummaryStore::new(&config.storage)?.load()?;

    let (rows, report) = aggregate(&state.records, &summaries);
    let path = output
        .cloned()
        .unwrap_or_else(|| config.storage.dataset_csv_path());
    write_dataset(&path, &rows)?;

    log_operation_success!("aggregate_dataset", rows = report.rows);
    println!("✅ {}", report.summary());
    println!("📁 Dataset written to {:?}", path);
    Ok(())
}

async fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    config_path: Option<&PathBuf>,
) -> HarvestResult<()> {
    if init {
        let config = HarvestConfig::default();
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
            .unwrap()
            .join("harvest");

        tokio::fs::create_dir_all(&config_dir).await?;
        let path = config_dir.join("config.toml");

        config.save_to_file(&path)?;
        println!("✅ Configuration initialized at: {:?}", path);
        println!("📝 Edit the file to adjust the search query, paths and timeouts.");
    }

    if show {
        let config = load_config(config_path).await?;
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(&config).unwrap());
    }

    if validate {
        let config = load_config(config_path).await?;
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}
