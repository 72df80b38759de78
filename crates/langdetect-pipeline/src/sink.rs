//! Batched sink writer
//!
//! Buffers result records and writes them with one bulk insert per batch.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::store::RecordStore;
use crate::types::ResultRecord;

/// Retry policy for failed bulk inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure; 0 fails fast
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn fail_fast() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}

pub struct BatchWriter<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    retry: RetryPolicy,
    batch: Vec<ResultRecord>,
    batches_flushed: usize,
    rows_written: usize,
}

impl<'a, S: RecordStore + ?Sized> BatchWriter<'a, S> {
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            retry: RetryPolicy::default(),
            batch: Vec::with_capacity(batch_size),
            batches_flushed: 0,
            rows_written: 0,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Buffer a result, flushing once the batch is full
    pub async fn add(&mut self, result: ResultRecord) -> PipelineResult<()> {
        self.batch.push(result);
        if self.batch.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write the whole pending batch in one insert; no-op when empty
    ///
    /// On failure the batch is kept so the caller can inspect it or try again.
    pub async fn flush(&mut self) -> PipelineResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let pending = self.batch.len();
        info!("saving {pending} entries to database...");

        let mut attempt = 0;
        loop {
            match self.store.insert_many(&self.batch).await {
                Ok(()) => break,
                Err(err) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        error = %err,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Bulk insert failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(source) => return Err(PipelineError::Flush { pending, source }),
            }
        }

        self.batch.clear();
        self.batches_flushed += 1;
        self.rows_written += pending;
        info!(rows = pending, batches = self.batches_flushed, "done.");
        Ok(())
    }

    /// Results waiting for the next flush
    pub fn pending(&self) -> &[ResultRecord] {
        &self.batch
    }

    pub fn batches_flushed(&self) -> usize {
        self.batches_flushed
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn result(id: i64) -> ResultRecord {
        ResultRecord {
            source_id: id,
            cleaned_text: format!("text {id}"),
            language: Some("en".into()),
        }
    }

    #[tokio::test]
    async fn test_flushes_exactly_at_threshold() {
        let store = MemoryStore::new();
        let mut writer = BatchWriter::new(&store, 3);

        writer.add(result(1)).await.unwrap();
        writer.add(result(2)).await.unwrap();
        assert_eq!(store.calls().insert_many, 0);
        assert_eq!(writer.pending().len(), 2);

        writer.add(result(3)).await.unwrap();
        assert_eq!(store.calls().insert_many, 1);
        assert!(writer.pending().is_empty());
        assert_eq!(store.results().len(), 3);
    }

    #[tokio::test]
    async fn test_final_flush_writes_partial_batch() {
        let store = MemoryStore::new();
        let mut writer = BatchWriter::new(&store, 10);
        writer.add(result(1)).await.unwrap();

        writer.flush().await.unwrap();
        assert_eq!(store.results(), vec![result(1)]);
        assert_eq!(writer.batches_flushed(), 1);
        assert_eq!(writer.rows_written(), 1);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let store = MemoryStore::new();
        let mut writer = BatchWriter::new(&store, 2);
        writer.flush().await.unwrap();
        assert_eq!(store.calls().insert_many, 0);
        assert_eq!(writer.batches_flushed(), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_batch() {
        let store = MemoryStore::new();
        store.fail_inserts_after(Some(0));
        let mut writer = BatchWriter::new(&store, 5);
        writer.add(result(1)).await.unwrap();
        writer.add(result(2)).await.unwrap();

        let err = writer.flush().await.unwrap_err();
        assert!(matches!(err, PipelineError::Flush { pending: 2, .. }));
        assert_eq!(writer.pending().len(), 2);
        assert!(store.results().is_empty());

        store.fail_inserts_after(None);
        writer.flush().await.unwrap();
        assert_eq!(store.results().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let store = MemoryStore::new();
        store.fail_inserts_after(Some(0));
        let mut writer = BatchWriter::new(&store, 1).with_retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
        });

        let flushing = writer.add(result(1));
        tokio::pin!(flushing);

        // First attempt fails and the writer sleeps before retrying
        tokio::select! {
            _ = &mut flushing => panic!("flush finished while inserts still fail"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {},
        }
        store.fail_inserts_after(None);

        flushing.await.unwrap();
        assert_eq!(store.results().len(), 1);
        assert_eq!(store.calls().insert_many, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_retries() {
        let store = MemoryStore::new();
        store.fail_inserts_after(Some(0));
        let mut writer = BatchWriter::new(&store, 1).with_retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
        });

        assert!(writer.add(result(1)).await.is_err());
        assert_eq!(store.calls().insert_many, 3);
        assert_eq!(writer.pending().len(), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }
}
