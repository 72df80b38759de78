//! Pipeline driver
//!
//! Pulls records from the reader, runs them through the classification stage
//! and pushes the results into the batch writer until the source is
//! exhausted, then forces a final flush.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

use crate::classify::{ClassificationStage, Outcome};
use crate::config::{PipelineConfig, SelectionMode};
use crate::error::PipelineResult;
use crate::reader::PaginatedReader;
use crate::sink::{BatchWriter, RetryPolicy};
use crate::store::RecordStore;

/// Sizing and selection for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub page_size: usize,
    pub batch_size: usize,
    pub selection: SelectionMode,
    pub retry: RetryPolicy,
}

impl PipelineOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            page_size: config.page_size,
            batch_size: config.batch_size,
            selection: config.selection,
            retry: RetryPolicy {
                max_retries: config.flush_retries,
                initial_backoff: config.flush_retry_backoff(),
            },
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// What one run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Source records consumed
    pub processed: usize,
    /// Records that got a language
    pub detected: usize,
    /// Records whose cleaned text was empty
    pub empty: usize,
    /// Records the classifier failed on
    pub failed: usize,
    pub batches_flushed: usize,
    pub rows_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

pub struct Pipeline<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    stage: ClassificationStage,
    options: PipelineOptions,
}

impl<'a, S: RecordStore + ?Sized> Pipeline<'a, S> {
    pub fn new(store: &'a S, stage: ClassificationStage, options: PipelineOptions) -> Self {
        Self {
            store,
            stage,
            options,
        }
    }

    /// Process every unprocessed source record
    ///
    /// Store failures abort the run; records consumed but not yet flushed are
    /// picked up again by the next run.
    #[instrument(skip(self), fields(selection = %self.options.selection))]
    pub async fn run(&self) -> PipelineResult<RunSummary> {
        let started = Instant::now();
        let started_at = Utc::now();
        let mut reader =
            PaginatedReader::open(self.store, self.options.selection, self.options.page_size)
                .await?;
        let mut writer =
            BatchWriter::new(self.store, self.options.batch_size).with_retry(self.options.retry);
        let mut summary = RunSummary {
            started_at,
            ..RunSummary::default()
        };

        while reader.has_remaining() {
            // The anti-join only sees written results
            if reader.mode().requires_flush_before_fetch() && reader.window_is_empty() {
                writer.flush().await?;
            }

            let Some(record) = reader.get_entry().await? else {
                break;
            };
            summary.processed += 1;

            let output = self.stage.evaluate(&record);
            match &output.outcome {
                Outcome::Detected(_) => summary.detected += 1,
                Outcome::Empty => summary.empty += 1,
                Outcome::Failed(err) => {
                    summary.failed += 1;
                    error!(
                        source_id = record.id,
                        raw_text = %record.text,
                        cleaned_text = %output.cleaned_text,
                        error = %err,
                        "ngram detection failed for entry {}",
                        record.id
                    );
                },
            }

            writer.add(output.into_result(&record)).await?;
        }

        writer.flush().await?;

        summary.batches_flushed = writer.batches_flushed();
        summary.rows_written = writer.rows_written();
        summary.elapsed = started.elapsed();
        summary.finished_at = Utc::now();

        info!(
            processed = summary.processed,
            detected = summary.detected,
            empty = summary.empty,
            failed = summary.failed,
            batches_flushed = summary.batches_flushed,
            rows_written = summary.rows_written,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            started_at = %summary.started_at.to_rfc3339(),
            "Run complete"
        );
        info!("FINISHED!");

        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::classify::RegexCleaner;
    use crate::error::ClassifyError;
    use crate::store::MemoryStore;
    use crate::types::LanguageCode;

    fn stage() -> ClassificationStage {
        ClassificationStage::new(RegexCleaner::new("[0-9]").unwrap(), |_: &str| {
            Ok::<_, ClassifyError>(LanguageCode::from("en"))
        })
    }

    #[tokio::test]
    async fn test_run_counts_outcomes() {
        let store = MemoryStore::with_sources([(1, "abc123"), (2, "9"), (3, "hello")]);
        let options = PipelineOptions {
            page_size: 2,
            batch_size: 2,
            ..PipelineOptions::default()
        };

        let summary = Pipeline::new(&store, stage(), options).run().await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.detected, 2);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.batches_flushed, 2);
        assert_eq!(summary.rows_written, 3);
        assert!(summary.finished_at >= summary.started_at);
    }

    #[test]
    fn test_options_from_config() {
        let config = PipelineConfig {
            flush_retries: 3,
            flush_retry_backoff_ms: 250,
            ..PipelineConfig::default()
        };
        let options = PipelineOptions::from_config(&config);
        assert_eq!(options.page_size, config.page_size);
        assert_eq!(options.retry.max_retries, 3);
        assert_eq!(options.retry.initial_backoff, Duration::from_millis(250));
    }
}
