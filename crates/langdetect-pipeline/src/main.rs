//! langdetect - language detection for database strings

use anyhow::{Context, Result};
use clap::Parser;
use langdetect_common::logging::{init_logging, LogConfig, LogLevel};
use tracing::info;

use langdetect_pipeline::classify::{ClassificationStage, NgramClassifier, RegexCleaner};
use langdetect_pipeline::db::{self, DbConfig};
use langdetect_pipeline::driver::{Pipeline, PipelineOptions};
use langdetect_pipeline::store::PgRecordStore;
use langdetect_pipeline::{PipelineConfig, SelectionMode};

#[derive(Parser, Debug)]
#[command(name = "langdetect")]
#[command(author, version, about = "Detect the language of every string in a database table")]
struct Cli {
    /// Source records fetched per page
    #[arg(long, env = "LANGDETECT_PAGE_SIZE")]
    page_size: Option<usize>,

    /// Results written per bulk insert
    #[arg(long, env = "LANGDETECT_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// SQL predicate restricting the source rows
    #[arg(long, env = "LANGDETECT_FILTER")]
    filter: Option<String>,

    /// Select unprocessed rows by anti-join instead of offset (slow, but safe
    /// while the source table changes)
    #[arg(long)]
    exclusion: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_name("ngram.log")
        .filter_directives("sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env(log_config).context("Invalid logging configuration")?;
    let _guard = init_logging(&log_config)?;

    let mut config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if cli.filter.is_some() {
        config.filter = cli.filter;
    }
    if cli.exclusion {
        config.selection = SelectionMode::Exclusion;
    }
    config.validate()?;

    info!(
        page_size = config.page_size,
        batch_size = config.batch_size,
        selection = %config.selection,
        source = %config.source.table,
        target = %config.target.table,
        "Starting language detection"
    );

    let db_config = DbConfig::from_env()?;
    let pool = db::connect(&db_config).await.context("Record store unreachable")?;

    let store = PgRecordStore::from_config(pool, &config);
    let cleaner = RegexCleaner::new(&config.clean_pattern)
        .with_context(|| format!("Invalid clean pattern {:?}", config.clean_pattern))?;
    let stage = ClassificationStage::new(cleaner, NgramClassifier::new());

    let summary = Pipeline::new(&store, stage, PipelineOptions::from_config(&config))
        .run()
        .await?;

    store.pool().close().await;
    info!(rows = summary.rows_written, "Language detection complete");
    Ok(())
}
