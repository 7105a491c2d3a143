//! The full-resync engine.

use crate::cancel::CancelCheck;
use pcache_core::{now_millis, CacheError, CacheResult, LocalRecord, LocalStore, RemotePageFetcher};
use std::sync::Arc;
use tracing::{debug, info};

/// A progress report from a running sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// Records committed so far.
    pub progress: u64,
    /// Same as `progress`; the remote side does not report a total.
    pub total: u64,
    /// True only on the last report of a successful run.
    pub is_complete: bool,
}

impl SyncProgress {
    /// A mid-run report.
    pub fn running(synced: u64) -> Self {
        Self {
            progress: synced,
            total: synced,
            is_complete: false,
        }
    }

    /// The final report of a successful run.
    pub fn finished(synced: u64) -> Self {
        Self {
            progress: synced,
            total: synced,
            is_complete: true,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Non-empty pages written.
    pub pages: u32,
    /// Records written.
    pub records: u64,
    /// Epoch milliseconds at which the run finished.
    pub completed_at: i64,
}

/// Pages through the remote bulk endpoint and mirrors it into a store.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    fetcher: Arc<dyn RemotePageFetcher>,
}

impl SyncEngine {
    /// Creates an engine writing into `store`.
    pub fn new(store: Arc<LocalStore>, fetcher: Arc<dyn RemotePageFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Returns the target store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Runs a full resync from page 1.
    ///
    /// Each non-empty page is written with one `batch_upsert`, then
    /// `on_progress` receives the cumulative count. The run stops after an
    /// empty page or a page shorter than `page_size`, and reports a final
    /// progress with `is_complete` set.
    ///
    /// `cancel` is polled before every fetch. Records are stamped with the
    /// local ingestion time.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Configuration`] if `page_size` is zero
    /// - [`CacheError::Aborted`] if cancelled; earlier pages stay committed
    /// - any fetch or store error, which ends the run immediately
    pub fn run(
        &self,
        cancel: &dyn CancelCheck,
        page_size: u32,
        on_progress: &mut dyn FnMut(SyncProgress),
    ) -> CacheResult<SyncReport> {
        if page_size == 0 {
            return Err(CacheError::configuration("sync page size must be at least 1"));
        }

        let workspace = self.store.workspace_id();
        let extras = &self.store.config().extra_fields;
        let mut synced = 0u64;
        let mut pages = 0u32;

        info!(workspace, page_size, "starting full sync");

        for page in 1u32.. {
            if cancel.is_cancelled() {
                info!(workspace, page, synced, "sync aborted");
                return Err(CacheError::Aborted { synced });
            }

            let batch = self.fetcher.fetch_page(page, page_size)?;
            let fetched = batch.len();
            if fetched == 0 {
                break;
            }

            let ingested_at = now_millis();
            let records: Vec<LocalRecord> = batch
                .into_iter()
                .map(|remote| remote.into_local(ingested_at, extras))
                .collect();
            synced += self.store.batch_upsert(records)? as u64;
            pages += 1;

            debug!(workspace, page, fetched, synced, "synced page");
            on_progress(SyncProgress::running(synced));

            if fetched < page_size as usize {
                break;
            }
        }

        let completed_at = now_millis();
        on_progress(SyncProgress::finished(synced));
        info!(workspace, pages, records = synced, "full sync complete");

        Ok(SyncReport {
            pages,
            records: synced,
            completed_at,
        })
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use pcache_core::{ExtraField, ExtraFields, StoreConfig};
    use pcache_testkit::PagedFetcher;
    use std::cell::Cell;

    struct CancelAfter {
        checks: Cell<u32>,
        allowed: u32,
    }

    impl CancelCheck for CancelAfter {
        fn is_cancelled(&self) -> bool {
            let seen = self.checks.get();
            self.checks.set(seen + 1);
            seen >= self.allowed
        }
    }

    fn engine(fetcher: &Arc<PagedFetcher>) -> SyncEngine {
        engine_with(fetcher, StoreConfig::in_memory())
    }

    fn engine_with(fetcher: &Arc<PagedFetcher>, config: StoreConfig) -> SyncEngine {
        let store = Arc::new(LocalStore::new("ws", config).unwrap());
        store.init().unwrap();
        SyncEngine::new(store, Arc::clone(fetcher) as Arc<dyn RemotePageFetcher>)
    }

    #[test]
    fn pages_until_short_page() {
        let fetcher = Arc::new(PagedFetcher::with_pages([1000, 1000, 400]));
        let engine = engine(&fetcher);
        let mut reports = Vec::new();

        let report = engine
            .run(&CancellationToken::new(), 1000, &mut |p| reports.push(p))
            .unwrap();

        assert_eq!(fetcher.calls(), 3);
        assert_eq!(
            fetcher.requests(),
            vec![(1, 1000), (2, 1000), (3, 1000)]
        );
        assert_eq!(engine.store().stats().unwrap().frames, 3);
        assert_eq!(report.pages, 3);
        assert_eq!(report.records, 2400);

        let last = reports.last().unwrap();
        assert_eq!(*last, SyncProgress::finished(2400));
        assert_eq!(last.total, last.progress);
        assert_eq!(
            reports.iter().filter(|p| p.is_complete).count(),
            1,
            "only the last report is complete"
        );
        assert_eq!(
            reports.iter().map(|p| p.progress).collect::<Vec<_>>(),
            vec![1000, 2000, 2400, 2400]
        );
    }

    #[test]
    fn empty_page_ends_run() {
        let fetcher = Arc::new(PagedFetcher::with_pages([5, 5]));
        let engine = engine(&fetcher);
        let report = engine
            .run(&CancellationToken::new(), 5, &mut |_| {})
            .unwrap();

        assert_eq!(fetcher.calls(), 3);
        assert_eq!(report.pages, 2);
        assert_eq!(engine.store().count().unwrap(), 10);
    }

    #[test]
    fn empty_remote_completes_with_zero() {
        let fetcher = Arc::new(PagedFetcher::with_pages([]));
        let engine = engine(&fetcher);
        let mut reports = Vec::new();
        let report = engine
            .run(&CancellationToken::new(), 10, &mut |p| reports.push(p))
            .unwrap();

        assert_eq!(report.records, 0);
        assert_eq!(reports, vec![SyncProgress::finished(0)]);
        assert!(!engine.store().has_any().unwrap());
    }

    #[test]
    fn cancellation_keeps_committed_pages() {
        let fetcher = Arc::new(PagedFetcher::with_pages([10, 10, 10, 10]));
        let engine = engine(&fetcher);
        let cancel = CancelAfter {
            checks: Cell::new(0),
            allowed: 2,
        };

        let mut reports = Vec::new();
        let result = engine.run(&cancel, 10, &mut |p| reports.push(p));

        assert!(matches!(result, Err(CacheError::Aborted { synced: 20 })));
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(engine.store().count().unwrap(), 20);
        assert!(reports.iter().all(|p| !p.is_complete));
    }

    #[test]
    fn fetch_error_ends_run() {
        let fetcher = Arc::new(PagedFetcher::with_pages([10, 10, 10]).failing_at(2));
        let engine = engine(&fetcher);
        let result = engine.run(&CancellationToken::new(), 10, &mut |_| {});

        assert!(matches!(result, Err(CacheError::Remote { .. })));
        assert_eq!(engine.store().count().unwrap(), 10);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let fetcher = Arc::new(PagedFetcher::with_pages([1]));
        let engine = engine(&fetcher);
        let result = engine.run(&CancellationToken::new(), 0, &mut |_| {});
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn configured_extras_are_copied() {
        let fetcher = Arc::new(PagedFetcher::with_pages([2]));
        let config = StoreConfig::in_memory()
            .with_extra_fields(ExtraFields::none().with(ExtraField::Gender));
        let engine = engine_with(&fetcher, config);
        engine
            .run(&CancellationToken::new(), 10, &mut |_| {})
            .unwrap();

        for record in engine.store().records().unwrap() {
            assert!(record.gender.is_some());
            assert!(record.date_of_birth.is_none());
            assert!(record.updated_at > 0);
        }
    }
}
