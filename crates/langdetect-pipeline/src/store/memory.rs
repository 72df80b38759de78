//! In-process record store
//!
//! Mirrors the PostgreSQL semantics (id ordering, filter, anti-join, all or
//! nothing inserts) without a database. Besides serving the test suite it
//! exposes call counters and failure injection.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{ResultRecord, SourceId, SourceRecord};

type SourcePredicate = Arc<dyn Fn(&SourceRecord) -> bool + Send + Sync>;

/// Record store held entirely in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    filter: Option<SourcePredicate>,
}

#[derive(Default)]
struct Inner {
    sources: BTreeMap<SourceId, String>,
    results: Vec<ResultRecord>,
    calls: StoreCalls,
    /// Number of further inserts that succeed before inserts start failing
    inserts_before_failure: Option<usize>,
    unavailable: bool,
}

/// How often each store operation was invoked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub count_results: usize,
    pub count_sources: usize,
    pub fetch_page: usize,
    pub fetch_page_excluding: usize,
    pub insert_many: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with source rows
    pub fn with_sources<I, T>(rows: I) -> Self
    where
        I: IntoIterator<Item = (SourceId, T)>,
        T: Into<String>,
    {
        let store = Self::new();
        store.insert_sources(rows);
        store
    }

    /// Same data, but only source rows matching `predicate` are visible
    pub fn filtered<F>(&self, predicate: F) -> Self
    where
        F: Fn(&SourceRecord) -> bool + Send + Sync + 'static,
    {
        Self {
            inner: Arc::clone(&self.inner),
            filter: Some(Arc::new(predicate)),
        }
    }

    pub fn insert_sources<I, T>(&self, rows: I)
    where
        I: IntoIterator<Item = (SourceId, T)>,
        T: Into<String>,
    {
        let mut inner = self.lock();
        for (id, text) in rows {
            inner.sources.insert(id, text.into());
        }
    }

    pub fn remove_sources(&self, ids: &[SourceId]) {
        let mut inner = self.lock();
        for id in ids {
            inner.sources.remove(id);
        }
    }

    /// Results written so far, in insertion order
    pub fn results(&self) -> Vec<ResultRecord> {
        self.lock().results.clone()
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    /// Let `successes` more inserts through, then fail every insert
    ///
    /// `None` clears the injected failure.
    pub fn fail_inserts_after(&self, successes: Option<usize>) {
        self.lock().inserts_before_failure = successes;
    }

    /// Make every operation fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn matching<'a>(&'a self, inner: &'a Inner) -> impl Iterator<Item = SourceRecord> + 'a {
        inner
            .sources
            .iter()
            .map(|(id, text)| SourceRecord::new(*id, text.as_str()))
            .filter(move |record| self.filter.as_ref().map_or(true, |keep| keep(record)))
    }
}

impl Inner {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count_results(&self) -> StoreResult<i64> {
        let mut inner = self.lock();
        inner.calls.count_results += 1;
        inner.check_available()?;
        Ok(inner.results.len() as i64)
    }

    async fn count_sources(&self) -> StoreResult<i64> {
        let mut inner = self.lock();
        inner.calls.count_sources += 1;
        inner.check_available()?;
        Ok(self.matching(&inner).count() as i64)
    }

    async fn fetch_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<SourceRecord>> {
        let mut inner = self.lock();
        inner.calls.fetch_page += 1;
        inner.check_available()?;

        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.matching(&inner).skip(offset).take(limit).collect())
    }

    async fn fetch_page_excluding(&self, limit: i64) -> StoreResult<Vec<SourceRecord>> {
        let mut inner = self.lock();
        inner.calls.fetch_page_excluding += 1;
        inner.check_available()?;

        let done: HashSet<SourceId> = inner.results.iter().map(|r| r.source_id).collect();
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .matching(&inner)
            .filter(|record| !done.contains(&record.id))
            .take(limit)
            .collect())
    }

    async fn insert_many(&self, rows: &[ResultRecord]) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.calls.insert_many += 1;
        inner.check_available()?;

        match inner.inserts_before_failure {
            Some(0) => {
                return Err(StoreError::Rejected(format!(
                    "injected failure inserting {} rows",
                    rows.len()
                )));
            },
            Some(n) => inner.inserts_before_failure = Some(n - 1),
            None => {},
        }

        inner.results.extend_from_slice(rows);
        Ok(())
    }
}
