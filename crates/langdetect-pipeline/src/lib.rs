//! langdetect pipeline library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams rows of a source table through text cleaning and language
//! classification and writes one result row per source row into a target
//! table, in bounded pages and batches.
//!
//! # Overview
//!
//! - **Store**: [`store::RecordStore`] over PostgreSQL ([`store::PgRecordStore`])
//!   or memory ([`store::MemoryStore`])
//! - **Reader**: [`reader::PaginatedReader`] hands out unprocessed records one
//!   at a time, by offset or by excluding already processed ids
//! - **Classification**: [`classify::ClassificationStage`] cleans the text and
//!   classifies it; per-record failures never stop the run
//! - **Sink**: [`sink::BatchWriter`] buffers results into bulk inserts
//! - **Driver**: [`driver::Pipeline`] wires the above together
//!
//! # Resuming
//!
//! A run can be stopped at any time. The next run counts the results already
//! in the target and continues from there; records that were consumed but not
//! flushed are simply read again.
//!
//! # Example
//!
//! ```no_run
//! use langdetect_pipeline::classify::{ClassificationStage, NgramClassifier, RegexCleaner};
//! use langdetect_pipeline::driver::{Pipeline, PipelineOptions};
//! use langdetect_pipeline::store::MemoryStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = MemoryStore::with_sources([(1, "hello world"), (2, "bonjour le monde")]);
//! let stage = ClassificationStage::new(RegexCleaner::new("[0-9]")?, NgramClassifier::new());
//!
//! let summary = Pipeline::new(&store, stage, PipelineOptions::default()).run().await?;
//! println!("{} records processed", summary.processed);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod progress;
pub mod reader;
pub mod sink;
pub mod store;
pub mod types;

pub use config::{PipelineConfig, SelectionMode};
pub use driver::{Pipeline, PipelineOptions, RunSummary};
pub use error::{ClassifyError, PipelineError, PipelineResult, StoreError};
pub use types::{LanguageCode, ResultRecord, SourceId, SourceRecord};
