//! Query-time choice between the local cache and remote search.

use pcache_core::{CacheError, CacheResult, LocalRecord, LocalStore, PatientFields, RemoteSearch};
use pcache_sync::SyncTracker;
use std::sync::Arc;
use tracing::{debug, warn};

/// Search results, tagged with where they came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResults {
    /// Answered by the local cache.
    Local(Vec<LocalRecord>),
    /// Answered by the remote service.
    Remote(Vec<PatientFields>),
}

impl SearchResults {
    /// Number of results.
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Local(records) => records.len(),
            SearchResults::Remote(records) => records.len(),
        }
    }

    /// Returns true if there are no results.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the local cache answered.
    pub fn is_local(&self) -> bool {
        matches!(self, SearchResults::Local(_))
    }

    /// Identifiers of the results, in order.
    pub fn ids(&self) -> Vec<String> {
        match self {
            SearchResults::Local(records) => records.iter().map(|r| r.id.clone()).collect(),
            SearchResults::Remote(records) => {
                records.iter().filter_map(|r| r.uid.clone()).collect()
            }
        }
    }
}

/// Routes each search to the local cache or the remote service.
pub struct SearchRouter {
    store: Option<Arc<LocalStore>>,
    remote: Arc<dyn RemoteSearch>,
    tracker: Arc<SyncTracker>,
    local_enabled: bool,
    remote_fields: Option<Vec<String>>,
}

impl SearchRouter {
    /// Creates a router.
    ///
    /// Local search is only attempted when `local_enabled` is set and a
    /// store is present.
    pub fn new(
        store: Option<Arc<LocalStore>>,
        remote: Arc<dyn RemoteSearch>,
        tracker: Arc<SyncTracker>,
        local_enabled: bool,
    ) -> Self {
        Self {
            local_enabled: local_enabled && store.is_some(),
            store,
            remote,
            tracker,
            remote_fields: None,
        }
    }

    /// Sets the default field selection for remote queries.
    #[must_use]
    pub fn with_remote_fields(mut self, fields: Option<Vec<String>>) -> Self {
        self.remote_fields = fields;
        self
    }

    /// Returns true if searches may be answered locally.
    pub fn local_enabled(&self) -> bool {
        self.local_enabled
    }

    /// Searches for `prefix`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingParameter`] for an empty prefix
    /// - [`CacheError::StillSyncing`] if local search is configured, not
    ///   forced off, and the first sync has not completed
    /// - any remote error
    pub fn search(
        &self,
        prefix: &str,
        limit: usize,
        force_remote: bool,
    ) -> CacheResult<SearchResults> {
        self.search_with_fields(prefix, limit, force_remote, None)
    }

    /// Like [`search`](Self::search), overriding the remote field selection.
    pub fn search_with_fields(
        &self,
        prefix: &str,
        limit: usize,
        force_remote: bool,
        fields: Option<&[String]>,
    ) -> CacheResult<SearchResults> {
        if prefix.is_empty() {
            return Err(CacheError::MissingParameter { name: "prefix" });
        }

        let local = self.store.as_ref().filter(|_| self.local_enabled && !force_remote);
        if let Some(store) = local {
            if !self.tracker.is_complete() {
                return Err(CacheError::StillSyncing);
            }

            match store.scan_prefix(prefix, limit) {
                Ok(records) => {
                    debug!(prefix, hits = records.len(), "answered from local cache");
                    return Ok(SearchResults::Local(records));
                }
                Err(e) if e.is_local_failure() => {
                    let e = CacheError::TransientCache {
                        message: e.to_string(),
                    };
                    warn!(error = %e, "falling back to remote search");
                }
                Err(e) => return Err(e),
            }
        }

        let fields = fields.or(self.remote_fields.as_deref());
        let records = self.remote.query(prefix, limit, fields)?;
        debug!(prefix, hits = records.len(), "answered from remote search");
        Ok(SearchResults::Remote(records))
    }
}

impl std::fmt::Debug for SearchRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRouter")
            .field("local_enabled", &self.local_enabled)
            .field("remote_fields", &self.remote_fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcache_testkit::{john_and_johnny, remote_patient, RecordingSearch, TestStore};

    struct Fixture {
        store: TestStore,
        remote: Arc<RecordingSearch>,
        tracker: Arc<SyncTracker>,
        router: SearchRouter,
    }

    fn fixture(local_enabled: bool) -> Fixture {
        let store = TestStore::memory("ws");
        store.batch_upsert(john_and_johnny()).unwrap();
        let remote = Arc::new(RecordingSearch::with_results(vec![remote_patient(
            "r1", "John Remote", "555",
        )]));
        let tracker = Arc::new(SyncTracker::new());
        let router = SearchRouter::new(
            Some(store.shared()),
            Arc::clone(&remote) as Arc<dyn RemoteSearch>,
            Arc::clone(&tracker),
            local_enabled,
        );
        Fixture {
            store,
            remote,
            tracker,
            router,
        }
    }

    fn complete(tracker: &SyncTracker) {
        tracker.begin().unwrap();
        tracker.complete(1);
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let f = fixture(true);
        assert!(matches!(
            f.router.search("", 10, true),
            Err(CacheError::MissingParameter { name: "prefix" })
        ));
        assert_eq!(f.remote.call_count(), 0);
    }

    #[test]
    fn still_syncing_unless_forced() {
        let f = fixture(true);
        assert!(matches!(
            f.router.search("john", 10, false),
            Err(CacheError::StillSyncing)
        ));

        let results = f.router.search("john", 10, true).unwrap();
        assert!(!results.is_local());
        assert_eq!(f.remote.call_count(), 1);
    }

    #[test]
    fn local_after_completion() {
        let f = fixture(true);
        complete(&f.tracker);

        let results = f.router.search("98", 10, false).unwrap();
        assert_eq!(results, SearchResults::Local(vec![john_and_johnny()[0].clone()]));
        assert_eq!(f.router.search("john", 10, false).unwrap().len(), 2);
        assert_eq!(f.remote.call_count(), 0);
    }

    #[test]
    fn forced_search_skips_a_ready_cache() {
        let f = fixture(true);
        complete(&f.tracker);
        assert_eq!(f.store.count().unwrap(), 2);

        let results = f.router.search("john", 10, true).unwrap();
        assert!(matches!(results, SearchResults::Remote(_)));
        assert_eq!(results.ids(), vec!["r1"]);
        assert_eq!(f.remote.call_count(), 1);
        assert_eq!(f.remote.calls()[0].prefix, "john");
    }

    #[test]
    fn closed_store_falls_back_to_remote() {
        let f = fixture(true);
        complete(&f.tracker);
        f.store.close();

        let results = f.router.search("john", 10, false).unwrap();
        assert_eq!(results.ids(), vec!["r1"]);
        assert_eq!(f.remote.call_count(), 1);
    }

    #[test]
    fn disabled_local_goes_remote_without_gate() {
        let f = fixture(false);
        let results = f.router.search("john", 7, false).unwrap();
        assert!(!results.is_local());
        assert_eq!(f.remote.calls()[0].limit, 7);
    }

    #[test]
    fn field_selection_override() {
        let remote = Arc::new(RecordingSearch::new());
        let router = SearchRouter::new(
            None,
            Arc::clone(&remote) as Arc<dyn RemoteSearch>,
            Arc::new(SyncTracker::new()),
            true,
        )
        .with_remote_fields(Some(vec!["uid".into()]));
        assert!(!router.local_enabled());

        router.search("a", 5, false).unwrap();
        let custom = vec!["uid".to_string(), "mobile".to_string()];
        router.search_with_fields("a", 5, false, Some(&custom)).unwrap();

        let calls = remote.calls();
        assert_eq!(calls[0].fields, Some(vec!["uid".to_string()]));
        assert_eq!(calls[1].fields, Some(custom));
    }

    #[test]
    fn remote_errors_surface() {
        let router = SearchRouter::new(
            None,
            Arc::new(RecordingSearch::failing(401)),
            Arc::new(SyncTracker::new()),
            false,
        );
        let err = router.search("a", 5, false).unwrap_err();
        assert_eq!(err.status_code(), Some(401));
    }
}
