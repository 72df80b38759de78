//! Paginated source reader
//!
//! Hands out unprocessed source records one at a time, fetching a page from
//! the store whenever its window runs dry. Resuming needs no checkpoint: the
//! number of results already in the target tells the reader where to start.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::SelectionMode;
use crate::error::{PipelineError, PipelineResult};
use crate::progress::{format_eta, RunState};
use crate::store::RecordStore;
use crate::types::SourceRecord;

pub struct PaginatedReader<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    mode: SelectionMode,
    page_size: usize,
    window: VecDeque<SourceRecord>,
    state: RunState,
}

impl<'a, S: RecordStore + ?Sized> PaginatedReader<'a, S> {
    /// Count existing results and matching sources; fails if the store is
    /// unreachable
    pub async fn open(store: &'a S, mode: SelectionMode, page_size: usize) -> PipelineResult<Self> {
        let initial_result_count = store.count_results().await.map_err(PipelineError::Count)?;

        info!("counting remaining entries...");
        let source_count = store.count_sources().await.map_err(PipelineError::Count)?;

        let state = RunState::new(initial_result_count, source_count);
        if source_count < initial_result_count {
            warn!(
                source_count,
                initial_result_count, "More results than matching sources; nothing to do"
            );
        }
        info!(
            remaining = state.remaining_count,
            initial_result_count,
            %mode,
            "{} entries remaining...",
            state.remaining_count
        );

        Ok(Self {
            store,
            mode,
            page_size: page_size.max(1),
            window: VecDeque::new(),
            state,
        })
    }

    /// Next unprocessed record, or `None` once the source is exhausted
    pub async fn get_entry(&mut self) -> PipelineResult<Option<SourceRecord>> {
        if !self.state.has_remaining() {
            return Ok(None);
        }

        if self.window.is_empty() {
            self.fetch_next_page().await?;
        }

        match self.window.pop_front() {
            Some(record) => {
                self.state.consume();
                Ok(Some(record))
            },
            None => match self.mode {
                SelectionMode::Offset => Err(PipelineError::SourceDrift {
                    remaining: self.state.remaining_count,
                }),
                // The anti-join came back empty: every matching row has a result
                SelectionMode::Exclusion => {
                    warn!(
                        expected = self.state.remaining_count,
                        "source shrank during the run; no unprocessed entries left"
                    );
                    self.state.remaining_count = 0;
                    Ok(None)
                },
            },
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.state.has_remaining()
    }

    /// Whether the next `get_entry` call will hit the store
    pub fn window_is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn eta(&self) -> Option<Duration> {
        self.state.eta()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    async fn fetch_next_page(&mut self) -> PipelineResult<()> {
        let limit = self.state.remaining_count.min(self.page_size as i64);

        let (offset, page) = match self.mode {
            SelectionMode::Offset => {
                let offset = self.state.next_offset();
                info!("fetching {limit} entries, offset {offset}...");
                let page = self.store.fetch_page(offset, limit).await.map_err(|source| {
                    PipelineError::Fetch {
                        offset: Some(offset),
                        limit,
                        source,
                    }
                })?;
                (Some(offset), page)
            },
            SelectionMode::Exclusion => {
                info!("fetching {limit} entries...");
                let page = self
                    .store
                    .fetch_page_excluding(limit)
                    .await
                    .map_err(|source| PipelineError::Fetch {
                        offset: None,
                        limit,
                        source,
                    })?;
                (None, page)
            },
        };

        let fetched = page.len();
        self.window.extend(page);
        // A store may ignore the limit; never hold more than is still owed
        self.window.truncate(limit.max(0) as usize);

        info!(
            fetched,
            offset,
            remaining = self.state.remaining_count,
            "done. {} remaining... {} time remaining...",
            self.state.remaining_count,
            format_eta(self.eta())
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::ResultRecord;

    fn store(n: i64) -> MemoryStore {
        MemoryStore::with_sources((1..=n).map(|id| (id, format!("text {id}"))))
    }

    async fn drain(reader: &mut PaginatedReader<'_, MemoryStore>) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Some(record) = reader.get_entry().await.unwrap() {
            ids.push(record.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_reads_every_record_once_in_order() {
        let store = store(10);
        let mut reader = PaginatedReader::open(&store, SelectionMode::Offset, 3).await.unwrap();

        assert_eq!(drain(&mut reader).await, (1..=10).collect::<Vec<_>>());
        assert!(!reader.has_remaining());
        assert_eq!(reader.state().detected_count, 10);
        // ceil(10 / 3) pages
        assert_eq!(store.calls().fetch_page, 4);
    }

    #[tokio::test]
    async fn test_fetch_is_lazy() {
        let store = store(5);
        let mut reader = PaginatedReader::open(&store, SelectionMode::Offset, 2).await.unwrap();
        assert_eq!(store.calls().fetch_page, 0);
        assert!(reader.window_is_empty());

        reader.get_entry().await.unwrap();
        assert_eq!(store.calls().fetch_page, 1);
        assert!(!reader.window_is_empty());
    }

    #[tokio::test]
    async fn test_resumes_after_existing_results() {
        let store = store(6);
        let done: Vec<_> = (1..=4)
            .map(|id| ResultRecord {
                source_id: id,
                cleaned_text: String::new(),
                language: None,
            })
            .collect();
        store.insert_many(&done).await.unwrap();

        let mut reader = PaginatedReader::open(&store, SelectionMode::Offset, 50).await.unwrap();
        assert_eq!(reader.state().remaining_count, 2);
        assert_eq!(drain(&mut reader).await, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_more_results_than_sources_reads_nothing() {
        let store = store(2);
        let done: Vec<_> = (1..=3)
            .map(|id| ResultRecord {
                source_id: id,
                cleaned_text: String::new(),
                language: None,
            })
            .collect();
        store.insert_many(&done).await.unwrap();

        let mut reader = PaginatedReader::open(&store, SelectionMode::Offset, 10).await.unwrap();
        assert_eq!(reader.state().remaining_count, 0);
        assert!(reader.get_entry().await.unwrap().is_none());
        assert_eq!(store.calls().fetch_page, 0);
    }

    #[tokio::test]
    async fn test_vanished_rows_are_source_drift() {
        let store = store(4);
        let mut reader = PaginatedReader::open(&store, SelectionMode::Offset, 2).await.unwrap();
        reader.get_entry().await.unwrap();
        reader.get_entry().await.unwrap();

        store.remove_sources(&[3, 4]);
        let err = reader.get_entry().await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceDrift { remaining: 2 }));
    }

    #[tokio::test]
    async fn test_exclusion_mode_ends_when_rows_vanish() {
        let store = store(4);
        let mut reader = PaginatedReader::open(&store, SelectionMode::Exclusion, 2).await.unwrap();
        assert_eq!(reader.get_entry().await.unwrap().map(|r| r.id), Some(1));
        assert_eq!(reader.get_entry().await.unwrap().map(|r| r.id), Some(2));
        store
            .insert_many(&[1, 2].map(|id| ResultRecord {
                source_id: id,
                cleaned_text: String::new(),
                language: None,
            }))
            .await
            .unwrap();

        store.remove_sources(&[3, 4]);
        assert!(reader.get_entry().await.unwrap().is_none());
        assert!(!reader.has_remaining());
        assert_eq!(reader.state().remaining_count, 0);
        assert_eq!(store.calls().fetch_page_excluding, 2);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_open() {
        let store = store(1);
        store.set_unavailable(true);
        let err = PaginatedReader::open(&store, SelectionMode::Offset, 1).await.err().unwrap();
        assert!(matches!(err, PipelineError::Count(_)));
    }

    #[tokio::test]
    async fn test_fetch_failure_carries_offset() {
        let store = store(3);
        let mut reader = PaginatedReader::open(&store, SelectionMode::Offset, 2).await.unwrap();
        store.set_unavailable(true);

        let err = reader.get_entry().await.unwrap_err();
        match err {
            PipelineError::Fetch { offset, limit, .. } => {
                assert_eq!(offset, Some(0));
                assert_eq!(limit, 2);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exclusion_mode_uses_anti_join() {
        let store = store(3);
        let mut reader = PaginatedReader::open(&store, SelectionMode::Exclusion, 10).await.unwrap();

        assert_eq!(drain(&mut reader).await, vec![1, 2, 3]);
        assert_eq!(store.calls().fetch_page_excluding, 1);
        assert_eq!(store.calls().fetch_page, 0);
    }
}
