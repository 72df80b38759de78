//! Pipeline configuration
//!
//! Values come from the environment (optionally via a `.env` file) with the
//! defaults below; the binary applies command-line overrides on top and then
//! calls [`PipelineConfig::validate`].

use langdetect_common::{env, CommonError};
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default number of source records fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 50_000;

/// Default number of results written per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

pub const DEFAULT_SOURCE_TABLE: &str = "langstrings";
pub const DEFAULT_SOURCE_ID_COLUMN: &str = "id";
pub const DEFAULT_SOURCE_TEXT_COLUMN: &str = "str";

pub const DEFAULT_TARGET_TABLE: &str = "langstrings-langs";
pub const DEFAULT_TARGET_ID_COLUMN: &str = "langstring_id";
pub const DEFAULT_TARGET_TEXT_COLUMN: &str = "str_clean";
pub const DEFAULT_TARGET_LANGUAGE_COLUMN: &str = "ngram_lang";

/// Default cleaning rule: strip ASCII digits.
pub const DEFAULT_CLEAN_PATTERN: &str = "[0-9]";

/// Default number of extra bulk insert attempts (0 = fail fast).
pub const DEFAULT_FLUSH_RETRIES: u32 = 0;

/// Default delay before the first bulk insert retry, doubled per attempt.
pub const DEFAULT_FLUSH_RETRY_BACKOFF_MS: u64 = 500;

/// How the reader selects the next page of unprocessed source records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Ordered scan by id starting at `results already written + consumed`.
    ///
    /// Only correct while neither the source rows nor the filter change
    /// during the run; offsets drift otherwise.
    #[default]
    Offset,
    /// Anti-join against the target table.
    ///
    /// Tolerates concurrent changes to the source, but each page scans the
    /// whole target key set, which gets slower as the target grows.
    Exclusion,
}

impl SelectionMode {
    /// Whether pending results must reach the store before the next page is read
    pub fn requires_flush_before_fetch(self) -> bool {
        matches!(self, SelectionMode::Exclusion)
    }
}

impl std::str::FromStr for SelectionMode {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "offset" | "fast" => Ok(SelectionMode::Offset),
            "exclusion" | "secure" => Ok(SelectionMode::Exclusion),
            _ => Err(CommonError::invalid_value("selection mode", s, "expected offset|exclusion")),
        }
    }
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMode::Offset => write!(f, "offset"),
            SelectionMode::Exclusion => write!(f, "exclusion"),
        }
    }
}

/// Source table layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    pub table: String,
    /// Primary key column, used for ordering and exclusion
    pub id_column: String,
    /// Column holding the text to classify
    pub text_column: String,
}

impl Default for SourceTable {
    fn default() -> Self {
        Self {
            table: DEFAULT_SOURCE_TABLE.to_string(),
            id_column: DEFAULT_SOURCE_ID_COLUMN.to_string(),
            text_column: DEFAULT_SOURCE_TEXT_COLUMN.to_string(),
        }
    }
}

/// Target table layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub table: String,
    /// Column referencing the source primary key
    pub source_id_column: String,
    pub cleaned_text_column: String,
    pub language_column: String,
}

impl Default for TargetTable {
    fn default() -> Self {
        Self {
            table: DEFAULT_TARGET_TABLE.to_string(),
            source_id_column: DEFAULT_TARGET_ID_COLUMN.to_string(),
            cleaned_text_column: DEFAULT_TARGET_TEXT_COLUMN.to_string(),
            language_column: DEFAULT_TARGET_LANGUAGE_COLUMN.to_string(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Source records fetched per page
    pub page_size: usize,
    /// Results written per bulk insert
    pub batch_size: usize,
    pub source: SourceTable,
    pub target: TargetTable,
    /// SQL predicate restricting the source rows, e.g. `lang_hint IS NULL`
    pub filter: Option<String>,
    pub selection: SelectionMode,
    /// Regex whose matches are removed from the text before classification
    pub clean_pattern: String,
    /// Extra bulk insert attempts after a failure
    pub flush_retries: u32,
    pub flush_retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            source: SourceTable::default(),
            target: TargetTable::default(),
            filter: None,
            selection: SelectionMode::default(),
            clean_pattern: DEFAULT_CLEAN_PATTERN.to_string(),
            flush_retries: DEFAULT_FLUSH_RETRIES,
            flush_retry_backoff_ms: DEFAULT_FLUSH_RETRY_BACKOFF_MS,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            page_size: env::parse_or("LANGDETECT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            batch_size: env::parse_or("LANGDETECT_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            source: SourceTable {
                table: env::string_or("LANGDETECT_SOURCE_TABLE", DEFAULT_SOURCE_TABLE),
                id_column: env::string_or("LANGDETECT_SOURCE_ID_COLUMN", DEFAULT_SOURCE_ID_COLUMN),
                text_column: env::string_or(
                    "LANGDETECT_SOURCE_TEXT_COLUMN",
                    DEFAULT_SOURCE_TEXT_COLUMN,
                ),
            },
            target: TargetTable {
                table: env::string_or("LANGDETECT_TARGET_TABLE", DEFAULT_TARGET_TABLE),
                source_id_column: env::string_or(
                    "LANGDETECT_TARGET_ID_COLUMN",
                    DEFAULT_TARGET_ID_COLUMN,
                ),
                cleaned_text_column: env::string_or(
                    "LANGDETECT_TARGET_TEXT_COLUMN",
                    DEFAULT_TARGET_TEXT_COLUMN,
                ),
                language_column: env::string_or(
                    "LANGDETECT_TARGET_LANGUAGE_COLUMN",
                    DEFAULT_TARGET_LANGUAGE_COLUMN,
                ),
            },
            filter: env::var("LANGDETECT_FILTER"),
            selection: env::parse_or("LANGDETECT_SELECTION", SelectionMode::default())?,
            clean_pattern: env::string_or("LANGDETECT_CLEAN_PATTERN", DEFAULT_CLEAN_PATTERN),
            flush_retries: env::parse_or("LANGDETECT_FLUSH_RETRIES", DEFAULT_FLUSH_RETRIES)?,
            flush_retry_backoff_ms: env::parse_or(
                "LANGDETECT_FLUSH_RETRY_BACKOFF_MS",
                DEFAULT_FLUSH_RETRY_BACKOFF_MS,
            )?,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.page_size == 0 {
            anyhow::bail!("page_size must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        let names = [
            ("source table", &self.source.table),
            ("source id column", &self.source.id_column),
            ("source text column", &self.source.text_column),
            ("target table", &self.target.table),
            ("target id column", &self.target.source_id_column),
            ("target text column", &self.target.cleaned_text_column),
            ("target language column", &self.target.language_column),
        ];
        for (what, name) in names {
            if name.trim().is_empty() {
                anyhow::bail!("{what} name cannot be empty");
            }
        }

        if let Some(filter) = &self.filter {
            if filter.trim().is_empty() {
                anyhow::bail!("filter cannot be blank; leave it unset instead");
            }
        }

        if let Err(err) = regex::Regex::new(&self.clean_pattern) {
            anyhow::bail!("clean_pattern {:?} is not a valid regex: {}", self.clean_pattern, err);
        }

        if self.selection == SelectionMode::Exclusion {
            tracing::warn!(
                "Exclusion selection re-scans the target table for every page; expect slow pages on large targets"
            );
        }

        Ok(())
    }

    /// Delay before the first bulk insert retry
    pub fn flush_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.flush_retry_backoff_ms)
    }
}
