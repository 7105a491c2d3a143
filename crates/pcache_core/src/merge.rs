//! Incremental cache maintenance after CRUD calls.

use crate::error::{CacheError, CacheResult};
use crate::record::{now_millis, LocalRecord, RecordUpdate};
use crate::remote::PatientFields;
use crate::store::LocalStore;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Applies single-record deltas from the CRUD layer to a [`LocalStore`].
///
/// Both hooks are best-effort: every failure is logged and swallowed, so
/// cache maintenance can never fail or roll back the CRUD call that
/// triggered it.
#[derive(Debug, Clone)]
pub struct IncrementalUpdateMerger {
    store: Arc<LocalStore>,
}

impl IncrementalUpdateMerger {
    /// Creates a merger writing into `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Caches a newly created record.
    ///
    /// Fields on the service `response` win; anything it omitted is taken
    /// from the original `request` payload.
    pub fn on_record_created(&self, response: &PatientFields, request: &PatientFields) {
        if let Err(e) = self.try_created(response, request) {
            warn!(
                workspace = %self.store.workspace_id(),
                error = %e,
                "failed to cache created record"
            );
        }
    }

    /// Merges changed fields into an existing cached record.
    pub fn on_record_updated(&self, id: &str, changed: &PatientFields) {
        if let Err(e) = self.try_updated(id, changed) {
            warn!(
                workspace = %self.store.workspace_id(),
                id,
                error = %e,
                "failed to merge updated record into cache"
            );
        }
    }

    /// Runs [`on_record_created`](Self::on_record_created) on a detached thread.
    ///
    /// Returns `None` (after logging) if the thread could not be started.
    pub fn spawn_created(
        &self,
        response: PatientFields,
        request: PatientFields,
    ) -> Option<JoinHandle<()>> {
        let merger = self.clone();
        self.spawn("pcache-merge-create", move || {
            merger.on_record_created(&response, &request)
        })
    }

    /// Runs [`on_record_updated`](Self::on_record_updated) on a detached thread.
    pub fn spawn_updated(&self, id: String, changed: PatientFields) -> Option<JoinHandle<()>> {
        let merger = self.clone();
        self.spawn("pcache-merge-update", move || {
            merger.on_record_updated(&id, &changed)
        })
    }

    fn spawn(&self, name: &str, job: impl FnOnce() + Send + 'static) -> Option<JoinHandle<()>> {
        match thread::Builder::new().name(name.to_string()).spawn(job) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start cache maintenance task");
                None
            }
        }
    }

    fn try_created(&self, response: &PatientFields, request: &PatientFields) -> CacheResult<()> {
        let record = created_record(response, request, now_millis())?;
        debug!(id = %record.id, "caching created record");
        self.store.upsert_one(record)
    }

    fn try_updated(&self, id: &str, changed: &PatientFields) -> CacheResult<()> {
        let update = update_from_changes(changed, now_millis());
        debug!(id, "merging updated record");
        self.store.merge_partial(id, &update).map(|_| ())
    }
}

fn created_record(
    response: &PatientFields,
    request: &PatientFields,
    now: i64,
) -> CacheResult<LocalRecord> {
    fn pick<T: Clone>(primary: &Option<T>, fallback: &Option<T>) -> Option<T> {
        primary.clone().or_else(|| fallback.clone())
    }

    let id = pick(&response.uid, &request.uid)
        .filter(|id| !id.is_empty())
        .ok_or(CacheError::MissingParameter { name: "uid" })?;

    Ok(LocalRecord {
        id,
        display_name: response.display_name().or_else(|| request.display_name()),
        phone: pick(&response.mobile, &request.mobile),
        handle: pick(&response.username, &request.username),
        updated_at: now,
        date_of_birth: pick(&response.dob, &request.dob),
        gender: pick(&response.gender, &request.gender),
        age_derived: pick(&response.is_age, &request.is_age),
        health_id: pick(&response.health_id, &request.health_id),
    })
}

fn update_from_changes(changed: &PatientFields, now: i64) -> RecordUpdate {
    RecordUpdate {
        display_name: changed.display_name(),
        phone: changed.mobile.clone(),
        handle: changed.username.clone(),
        updated_at: Some(now),
        date_of_birth: changed.dob.clone(),
        gender: changed.gender.clone(),
        age_derived: changed.is_age,
        health_id: changed.health_id.clone(),
    }
}
