//! The caller-owned cache context.

use crate::config::SdkConfig;
use crate::router::{SearchResults, SearchRouter};
use pcache_core::{
    CacheError, CacheResult, IncrementalUpdateMerger, LocalStore, PatientFields,
    RemotePageFetcher, RemoteSearch, StoreStats,
};
use pcache_sync::{
    DispatcherConfig, ExecutionMode, SyncCallbacks, SyncDispatcher, SyncEngine, SyncStatus,
    SyncTracker, ThreadHost, WorkerHost,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;

/// One workspace's hybrid patient search cache.
///
/// Owns the local store, the sync dispatcher, the incremental merger and
/// the search router. There is no global instance; create one per
/// workspace and drop it (or call [`close`](Self::close)) when done.
///
/// # Example
///
/// ```rust,ignore
/// use pcache::{PatientCache, SdkConfig, SyncCallbacks};
///
/// let cache = PatientCache::new(SdkConfig::for_workspace("clinic-1"), fetcher, search)?;
/// cache.init()?;
/// cache.start_sync(SyncCallbacks::new().on_complete(|at| println!("synced at {at}")))?;
///
/// // Before the first sync completes local searches fail with StillSyncing;
/// // force a remote search instead.
/// let results = cache.search("john", 10, true)?;
/// ```
pub struct PatientCache {
    config: SdkConfig,
    store: Option<Arc<LocalStore>>,
    tracker: Arc<SyncTracker>,
    dispatcher: Option<SyncDispatcher>,
    merger: Option<IncrementalUpdateMerger>,
    router: SearchRouter,
}

impl PatientCache {
    /// Creates a cache that runs sync on a background thread when
    /// `config.background` is set.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] for an invalid configuration.
    pub fn new(
        config: SdkConfig,
        fetcher: Arc<dyn RemotePageFetcher>,
        search: Arc<dyn RemoteSearch>,
    ) -> CacheResult<Self> {
        Self::with_host(config, fetcher, search, Some(Arc::new(ThreadHost)))
    }

    /// Creates a cache with an explicit worker host. `None` keeps every
    /// sync run in the caller's thread.
    pub fn with_host(
        config: SdkConfig,
        fetcher: Arc<dyn RemotePageFetcher>,
        search: Arc<dyn RemoteSearch>,
        host: Option<Arc<dyn WorkerHost>>,
    ) -> CacheResult<Self> {
        config.validate()?;

        let tracker = Arc::new(SyncTracker::new());
        let store = match config.workspace() {
            Some(workspace) => Some(Arc::new(LocalStore::new(workspace, config.store.clone())?)),
            None => None,
        };

        let dispatcher = store.as_ref().map(|store| {
            let engine = Arc::new(SyncEngine::new(Arc::clone(store), fetcher));
            SyncDispatcher::new(
                engine,
                Arc::clone(&tracker),
                DispatcherConfig::default()
                    .with_page_size(config.page_size)
                    .with_background(config.background),
                host,
            )
        });
        let merger = store
            .as_ref()
            .map(|store| IncrementalUpdateMerger::new(Arc::clone(store)));
        let router = SearchRouter::new(
            store.clone(),
            search,
            Arc::clone(&tracker),
            config.local_search_configured(),
        )
        .with_remote_fields(config.remote_fields.clone());

        Ok(Self {
            config,
            store,
            tracker,
            dispatcher,
            merger,
            router,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Returns the local store, if a workspace is configured.
    pub fn store(&self) -> Option<&Arc<LocalStore>> {
        self.store.as_ref()
    }

    /// Opens the local store. Does nothing without a workspace.
    pub fn init(&self) -> CacheResult<()> {
        if let Some(store) = &self.store {
            store.init()?;
            info!(
                workspace = %store.workspace_id(),
                local_search = self.router.local_enabled(),
                "patient cache ready"
            );
        }
        Ok(())
    }

    /// Starts a full resync of the workspace.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Configuration`] without a workspace
    /// - [`CacheError::NotInitialized`] before [`init`](Self::init)
    /// - [`CacheError::Busy`] while a run is active
    pub fn start_sync(&self, callbacks: SyncCallbacks) -> CacheResult<ExecutionMode> {
        let (Some(store), Some(dispatcher)) = (&self.store, &self.dispatcher) else {
            return Err(CacheError::configuration("sync requires a workspace id"));
        };
        if !store.is_open() {
            return Err(CacheError::NotInitialized {
                workspace: store.workspace_id().to_string(),
            });
        }
        dispatcher.start(callbacks)
    }

    /// Requests cancellation of the active sync. Returns false if none was active.
    pub fn stop_sync(&self) -> bool {
        self.dispatcher.as_ref().is_some_and(SyncDispatcher::stop)
    }

    /// Returns the sync status.
    pub fn sync_status(&self) -> SyncStatus {
        self.tracker.status()
    }

    /// Searches by prefix. See [`SearchRouter::search`].
    pub fn search(
        &self,
        prefix: &str,
        limit: usize,
        force_remote: bool,
    ) -> CacheResult<SearchResults> {
        self.router.search(prefix, limit, force_remote)
    }

    /// Searches by prefix with an explicit remote field selection.
    pub fn search_with_fields(
        &self,
        prefix: &str,
        limit: usize,
        force_remote: bool,
        fields: &[String],
    ) -> CacheResult<SearchResults> {
        self.router
            .search_with_fields(prefix, limit, force_remote, Some(fields))
    }

    /// Deletes every cached record and forgets previous syncs.
    ///
    /// An active sync is stopped and waited for first, so it can never
    /// report completion over the cleared table. Local search is gated
    /// again until the next sync completes.
    pub fn clear_cache(&self) -> CacheResult<()> {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown();
        }
        if let Some(store) = &self.store {
            store.clear()?;
        }
        self.tracker.reset();
        Ok(())
    }

    /// Returns store statistics.
    pub fn stats(&self) -> CacheResult<Option<StoreStats>> {
        self.store.as_ref().map(|store| store.stats()).transpose()
    }

    /// Caches a record the CRUD layer just created, on a detached task.
    pub fn record_created(
        &self,
        response: PatientFields,
        request: PatientFields,
    ) -> Option<JoinHandle<()>> {
        self.merger
            .as_ref()
            .and_then(|merger| merger.spawn_created(response, request))
    }

    /// Merges a record the CRUD layer just updated, on a detached task.
    pub fn record_updated(
        &self,
        id: impl Into<String>,
        changed: PatientFields,
    ) -> Option<JoinHandle<()>> {
        let id = id.into();
        self.merger
            .as_ref()
            .and_then(|merger| merger.spawn_updated(id, changed))
    }

    /// Stops any sync, waits for its threads and closes the store.
    pub fn close(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown();
        }
        if let Some(store) = &self.store {
            store.close();
        }
    }
}

impl Drop for PatientCache {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PatientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientCache")
            .field("workspace_id", &self.config.workspace_id)
            .field("router", &self.router)
            .field("sync", &self.tracker.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcache_core::StoreConfig;
    use pcache_sync::SyncState;
    use pcache_testkit::{PagedFetcher, RecordingSearch};

    fn cache(config: SdkConfig) -> (PatientCache, Arc<PagedFetcher>, Arc<RecordingSearch>) {
        let fetcher = Arc::new(PagedFetcher::with_pages([3, 1]));
        let search = Arc::new(RecordingSearch::new());
        let cache = PatientCache::with_host(
            config.with_page_size(3),
            Arc::clone(&fetcher) as Arc<dyn RemotePageFetcher>,
            Arc::clone(&search) as Arc<dyn RemoteSearch>,
            None,
        )
        .unwrap();
        (cache, fetcher, search)
    }

    #[test]
    fn invalid_config_fails_construction() {
        let result = PatientCache::with_host(
            SdkConfig::default().with_local_search(true),
            Arc::new(PagedFetcher::with_pages([])),
            Arc::new(RecordingSearch::new()),
            None,
        );
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn sync_before_init_is_rejected() {
        let (cache, fetcher, _) = cache(SdkConfig::for_workspace("ws"));
        assert!(matches!(
            cache.start_sync(SyncCallbacks::new()),
            Err(CacheError::NotInitialized { .. })
        ));
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn remote_only_without_workspace() {
        let (cache, _, search) = cache(SdkConfig::default());
        cache.init().unwrap();
        assert!(cache.store().is_none());
        assert!(matches!(
            cache.start_sync(SyncCallbacks::new()),
            Err(CacheError::Configuration { .. })
        ));
        assert!(cache.record_created(PatientFields::default(), PatientFields::default()).is_none());

        cache.search("jo", 5, false).unwrap();
        assert_eq!(search.call_count(), 1);
    }

    #[test]
    fn in_process_sync_opens_local_search() {
        let (cache, _, search) = cache(
            SdkConfig::for_workspace("ws").with_store(StoreConfig::in_memory()),
        );
        cache.init().unwrap();
        assert!(matches!(
            cache.search("patient", 10, false),
            Err(CacheError::StillSyncing)
        ));

        cache.start_sync(SyncCallbacks::new()).unwrap();
        assert_eq!(cache.sync_status().state, SyncState::Complete);
        assert_eq!(cache.sync_status().records_synced, 4);

        let results = cache.search("patient 1-", 10, false).unwrap();
        assert!(results.is_local());
        assert_eq!(results.len(), 3);
        assert_eq!(search.call_count(), 0);
    }

    #[test]
    fn clear_cache_regates_search() {
        let (cache, _, _) = cache(SdkConfig::for_workspace("ws"));
        cache.init().unwrap();
        cache.start_sync(SyncCallbacks::new()).unwrap();

        cache.clear_cache().unwrap();
        assert_eq!(cache.sync_status().state, SyncState::Idle);
        assert_eq!(cache.stats().unwrap().unwrap().records, 0);
        assert!(matches!(
            cache.search("p", 10, false),
            Err(CacheError::StillSyncing)
        ));
    }

    #[test]
    fn crud_hooks_write_through() {
        let (cache, _, _) = cache(SdkConfig::for_workspace("ws"));
        cache.init().unwrap();

        cache
            .record_created(
                PatientFields {
                    uid: Some("n1".into()),
                    fln: Some("New Patient".into()),
                    ..PatientFields::default()
                },
                PatientFields::default(),
            )
            .unwrap()
            .join()
            .unwrap();
        cache
            .record_updated(
                "n1",
                PatientFields {
                    mobile: Some("700".into()),
                    ..PatientFields::default()
                },
            )
            .unwrap()
            .join()
            .unwrap();

        let record = cache.store().unwrap().get_by_oid("n1").unwrap().unwrap();
        assert_eq!(record.display_name.as_deref(), Some("New Patient"));
        assert_eq!(record.phone.as_deref(), Some("700"));
    }

    #[test]
    fn close_shuts_everything_down() {
        let (cache, _, search) = cache(SdkConfig::for_workspace("ws"));
        cache.init().unwrap();
        cache.start_sync(SyncCallbacks::new()).unwrap();
        cache.close();

        assert!(!cache.store().unwrap().is_open());
        assert!(!cache.stop_sync());
        let results = cache.search("patient", 10, false).unwrap();
        assert!(!results.is_local());
        assert_eq!(search.call_count(), 1);
    }
}
