//! Record store adapter
//!
//! The pipeline only needs four things from storage: counts, an ordered page
//! of source rows (by offset, or excluding rows that already have a result),
//! and a bulk insert of results. Implementations fix the source filter and the
//! table layout when they are constructed, so every query issued during one
//! run sees the same filter.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{ResultRecord, SourceRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of rows already present in the target
    async fn count_results(&self) -> StoreResult<i64>;

    /// Number of source rows matching the filter
    async fn count_sources(&self) -> StoreResult<i64>;

    /// Up to `limit` matching source rows ordered by id, skipping `offset`
    async fn fetch_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<SourceRecord>>;

    /// Up to `limit` matching source rows ordered by id that have no result yet
    async fn fetch_page_excluding(&self, limit: i64) -> StoreResult<Vec<SourceRecord>>;

    /// Write all `rows` in one operation; either every row lands or none does
    async fn insert_many(&self, rows: &[ResultRecord]) -> StoreResult<()>;
}
