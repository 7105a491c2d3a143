//! Workspace-scoped persistent record store.

use crate::config::{StoreConfig, StoreLocation};
use crate::error::{CacheError, CacheResult};
use crate::log::{self, ReplaySummary};
use crate::partition::{PartitionLock, PartitionName};
use crate::record::{LocalRecord, RecordUpdate};
use crate::table::{IndexName, RecordTable};
use parking_lot::RwLock;
use pcache_storage::{FileBackend, InMemoryBackend, StorageBackend};
use tracing::{debug, info, warn};

/// Point-in-time statistics for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Workspace the store is bound to.
    pub workspace_id: String,
    /// Table name derived from the workspace.
    pub table: String,
    /// Number of live records.
    pub records: usize,
    /// Number of frames in the record log.
    pub frames: usize,
    /// Size of the record log in bytes.
    pub log_bytes: u64,
    /// Entry count of each secondary index.
    pub indexes: Vec<(IndexName, usize)>,
    /// Maximum `updated_at` across records, zero when empty.
    pub latest_updated_at: i64,
}

/// State that exists only between `init()` and `close()`.
struct OpenStore {
    backend: Box<dyn StorageBackend>,
    table: RecordTable,
    frames: usize,
    _lock: Option<PartitionLock>,
}

impl OpenStore {
    /// Appends one frame; on failure the log is cut back to its previous length.
    fn append_frame(&mut self, frame: &[u8], sync: bool) -> CacheResult<()> {
        let before = self.backend.size()?;
        let written = self.backend.append(frame).and_then(|_| {
            if sync {
                self.backend.sync()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            if let Err(undo) = self.backend.truncate(before) {
                warn!(error = %undo, "failed to roll back partial frame");
            }
            return Err(e.into());
        }

        self.frames += 1;
        Ok(())
    }
}

/// A persistent, workspace-scoped table of cached patient records.
///
/// The store is bound to one workspace at construction and can only ever
/// see that workspace's partition. All data operations fail with
/// [`CacheError::NotInitialized`] until [`init`](Self::init) succeeds and
/// again after [`close`](Self::close).
///
/// Reads share a lock and may run while a sync is writing; a reader can
/// observe a table where some pages of a sync have landed and later ones
/// have not.
///
/// # Example
///
/// ```rust
/// use pcache_core::{LocalRecord, LocalStore, StoreConfig};
///
/// let store = LocalStore::new("clinic-1", StoreConfig::in_memory()).unwrap();
/// store.init().unwrap();
/// store
///     .batch_upsert(vec![LocalRecord::new("p1").with_display_name("John Doe")])
///     .unwrap();
/// assert_eq!(store.scan_prefix("jo", 10).unwrap().len(), 1);
/// ```
pub struct LocalStore {
    workspace_id: String,
    partition: PartitionName,
    config: StoreConfig,
    inner: RwLock<Option<OpenStore>>,
}

impl LocalStore {
    /// Creates a store bound to `workspace_id`. Nothing is opened yet.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if the workspace id is blank.
    pub fn new(workspace_id: impl Into<String>, config: StoreConfig) -> CacheResult<Self> {
        let workspace_id = workspace_id.into();
        if workspace_id.trim().is_empty() {
            return Err(CacheError::configuration(
                "local store requires a workspace id",
            ));
        }

        Ok(Self {
            partition: PartitionName::for_workspace(&workspace_id),
            workspace_id,
            config,
            inner: RwLock::new(None),
        })
    }

    /// Returns the bound workspace id.
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Returns the partition's table name.
    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns true between `init()` and `close()`.
    pub fn is_open(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Opens the partition, replaying its record log into the table.
    ///
    /// Calling `init()` on an open store does nothing. A torn tail frame
    /// left by a crash is cut off.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Locked`] if another handle has the partition
    /// open, [`CacheError::Corrupted`] for an undecodable checksummed frame,
    /// or a storage error.
    pub fn init(&self) -> CacheResult<()> {
        let mut inner = self.inner.write();
        if inner.is_some() {
            return Ok(());
        }

        let (mut backend, lock): (Box<dyn StorageBackend>, Option<PartitionLock>) =
            match &self.config.location {
                StoreLocation::Directory(dir) => {
                    let lock = PartitionLock::acquire(dir, &self.partition, &self.workspace_id)?;
                    let backend = FileBackend::open(&self.partition.log_path(dir))?;
                    (Box::new(backend), Some(lock))
                }
                StoreLocation::Memory => (Box::new(InMemoryBackend::new()), None),
            };

        let mut table = RecordTable::new();
        let bytes = backend.read_all()?;
        let summary: ReplaySummary = log::replay(&bytes, |batch| table.upsert_all(batch))?;

        if summary.torn_tail {
            warn!(
                workspace = %self.workspace_id,
                valid_len = summary.valid_len,
                discarded = bytes.len() as u64 - summary.valid_len,
                "discarding torn tail of record log"
            );
            backend.truncate(summary.valid_len)?;
        }

        info!(
            workspace = %self.workspace_id,
            table = %self.partition,
            records = table.len(),
            frames = summary.frames,
            "opened local store"
        );

        *inner = Some(OpenStore {
            backend,
            table,
            frames: summary.frames,
            _lock: lock,
        });
        Ok(())
    }

    /// Releases the partition. Later calls fail until `init()` runs again.
    pub fn close(&self) {
        if self.inner.write().take().is_some() {
            debug!(workspace = %self.workspace_id, "closed local store");
        }
    }

    fn not_initialized(&self) -> CacheError {
        CacheError::NotInitialized {
            workspace: self.workspace_id.clone(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&OpenStore) -> T) -> CacheResult<T> {
        let inner = self.inner.read();
        let open = inner.as_ref().ok_or_else(|| self.not_initialized())?;
        Ok(f(open))
    }

    fn write<T>(&self, f: impl FnOnce(&mut OpenStore) -> CacheResult<T>) -> CacheResult<T> {
        let mut inner = self.inner.write();
        let open = inner.as_mut().ok_or_else(|| self.not_initialized())?;
        f(open)
    }

    /// Writes `records` as one atomic unit and returns how many were written.
    ///
    /// Each record replaces any existing record with the same id. Nothing
    /// becomes visible unless the whole batch reached the log.
    pub fn batch_upsert(&self, mut records: Vec<LocalRecord>) -> CacheResult<usize> {
        for record in &mut records {
            self.config.extra_fields.project(record);
        }
        let count = records.len();

        self.write(|open| {
            if records.is_empty() {
                return Ok(0);
            }
            let frame = log::encode_batch(&records)?;
            open.append_frame(&frame, self.config.sync_on_write)?;
            open.table.upsert_all(records);
            Ok(count)
        })
    }

    /// Writes a single record.
    pub fn upsert_one(&self, record: LocalRecord) -> CacheResult<()> {
        self.batch_upsert(vec![record]).map(|_| ())
    }

    /// Shallow-merges `updates` over the existing record `id` and returns
    /// the merged row.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if no record has that id.
    pub fn merge_partial(&self, id: &str, updates: &RecordUpdate) -> CacheResult<LocalRecord> {
        self.write(|open| {
            let mut merged = open
                .table
                .get(id)
                .cloned()
                .ok_or_else(|| CacheError::not_found(id))?;
            merged.apply(updates);
            self.config.extra_fields.project(&mut merged);

            let frame = log::encode_batch(std::slice::from_ref(&merged))?;
            open.append_frame(&frame, self.config.sync_on_write)?;
            open.table.upsert(merged.clone());
            Ok(merged)
        })
    }

    /// Looks up a record by id.
    pub fn get_by_oid(&self, id: &str) -> CacheResult<Option<LocalRecord>> {
        self.read(|open| open.table.get(id).cloned())
    }

    /// Returns up to `limit` records matching `prefix`.
    ///
    /// All-digit prefixes match the phone number literally or the handle
    /// case-insensitively; any other prefix matches the display name or
    /// the handle case-insensitively. Records are visited in primary-key
    /// order and the scan stops at `limit`.
    pub fn scan_prefix(&self, prefix: &str, limit: usize) -> CacheResult<Vec<LocalRecord>> {
        self.read(|open| open.table.scan_prefix(prefix, limit))
    }

    /// Returns true if the partition holds at least one record.
    pub fn has_any(&self) -> CacheResult<bool> {
        self.read(|open| !open.table.is_empty())
    }

    /// Returns the number of records.
    pub fn count(&self) -> CacheResult<usize> {
        self.read(|open| open.table.len())
    }

    /// Returns the maximum `updated_at`, or zero when empty.
    pub fn latest_updated_at(&self) -> CacheResult<i64> {
        self.read(|open| open.table.latest_updated_at())
    }

    /// Returns every record in primary-key order.
    pub fn records(&self) -> CacheResult<Vec<LocalRecord>> {
        self.read(|open| open.table.rows().cloned().collect())
    }

    /// Deletes every record in the partition.
    pub fn clear(&self) -> CacheResult<()> {
        self.write(|open| {
            open.backend.truncate(0)?;
            open.backend.sync()?;
            open.table.clear();
            open.frames = 0;
            info!(workspace = %self.workspace_id, "cleared local store");
            Ok(())
        })
    }

    /// Rewrites the record log as a single frame of live records.
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&self) -> CacheResult<u64> {
        self.write(|open| {
            let before = open.backend.size()?;
            let rows: Vec<LocalRecord> = open.table.rows().cloned().collect();
            let bytes = if rows.is_empty() {
                Vec::new()
            } else {
                log::encode_batch(&rows)?
            };

            open.backend.replace(&bytes)?;
            open.frames = usize::from(!rows.is_empty());
            let reclaimed = before.saturating_sub(bytes.len() as u64);
            info!(
                workspace = %self.workspace_id,
                records = rows.len(),
                reclaimed,
                "compacted record log"
            );
            Ok(reclaimed)
        })
    }

    /// Returns statistics for the partition.
    pub fn stats(&self) -> CacheResult<StoreStats> {
        let inner = self.inner.read();
        let open = inner.as_ref().ok_or_else(|| self.not_initialized())?;
        Ok(StoreStats {
            workspace_id: self.workspace_id.clone(),
            table: self.partition.to_string(),
            records: open.table.len(),
            frames: open.frames,
            log_bytes: open.backend.size()?,
            indexes: IndexName::ALL
                .iter()
                .map(|&index| (index, open.table.index_len(index)))
                .collect(),
            latest_updated_at: open.table.latest_updated_at(),
        })
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("workspace_id", &self.workspace_id)
            .field("partition", &self.partition)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ExtraField, ExtraFields};

    fn open_memory() -> LocalStore {
        let store = LocalStore::new("ws", StoreConfig::in_memory()).unwrap();
        store.init().unwrap();
        store
    }

    #[test]
    fn blank_workspace_is_a_configuration_error() {
        assert!(matches!(
            LocalStore::new("  ", StoreConfig::in_memory()),
            Err(CacheError::Configuration { .. })
        ));
    }

    #[test]
    fn operations_before_init_fail() {
        let store = LocalStore::new("ws", StoreConfig::in_memory()).unwrap();
        assert!(matches!(
            store.has_any(),
            Err(CacheError::NotInitialized { .. })
        ));
        assert!(matches!(
            store.upsert_one(LocalRecord::new("1")),
            Err(CacheError::NotInitialized { .. })
        ));
    }

    #[test]
    fn init_is_idempotent() {
        let store = open_memory();
        store.upsert_one(LocalRecord::new("1")).unwrap();
        store.init().unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn close_then_use_fails_until_reinit() {
        let store = open_memory();
        store.close();
        assert!(!store.is_open());
        assert!(matches!(
            store.scan_prefix("a", 5),
            Err(CacheError::NotInitialized { .. })
        ));

        store.init().unwrap();
        assert!(!store.has_any().unwrap());
    }

    #[test]
    fn batch_then_clear() {
        let store = open_memory();
        let records = (0..25).map(|i| LocalRecord::new(format!("p{i}"))).collect();
        assert_eq!(store.batch_upsert(records).unwrap(), 25);
        assert!(store.has_any().unwrap());

        store.clear().unwrap();
        assert!(!store.has_any().unwrap());
        assert_eq!(store.stats().unwrap().log_bytes, 0);
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let store = open_memory();
        assert_eq!(store.batch_upsert(Vec::new()).unwrap(), 0);
        assert_eq!(store.stats().unwrap().frames, 0);
    }

    #[test]
    fn merge_partial_keeps_other_fields() {
        let store = open_memory();
        store
            .upsert_one(LocalRecord::new("x").with_display_name("A").with_phone("1"))
            .unwrap();

        let merged = store
            .merge_partial(
                "x",
                &RecordUpdate {
                    display_name: Some("B".into()),
                    ..RecordUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(merged, LocalRecord::new("x").with_display_name("B").with_phone("1"));
        assert_eq!(store.get_by_oid("x").unwrap(), Some(merged));
    }

    #[test]
    fn merge_partial_missing_record() {
        let store = open_memory();
        let result = store.merge_partial("ghost", &RecordUpdate::default());
        assert!(matches!(result, Err(CacheError::NotFound { id }) if id == "ghost"));
    }

    #[test]
    fn latest_updated_at_tracks_maximum() {
        let store = open_memory();
        assert_eq!(store.latest_updated_at().unwrap(), 0);
        store
            .batch_upsert(vec![
                LocalRecord::new("a").with_updated_at(30),
                LocalRecord::new("b").with_updated_at(70),
            ])
            .unwrap();
        assert_eq!(store.latest_updated_at().unwrap(), 70);
    }

    #[test]
    fn unconfigured_extras_are_not_stored() {
        let config = StoreConfig::in_memory()
            .with_extra_fields(ExtraFields::none().with(ExtraField::DateOfBirth));
        let store = LocalStore::new("ws", config).unwrap();
        store.init().unwrap();

        let mut record = LocalRecord::new("1");
        record.date_of_birth = Some("2001-02-03".into());
        record.gender = Some("F".into());
        store.upsert_one(record).unwrap();

        let stored = store.get_by_oid("1").unwrap().unwrap();
        assert_eq!(stored.date_of_birth.as_deref(), Some("2001-02-03"));
        assert!(stored.gender.is_none());
    }

    #[test]
    fn stats_report_indexes() {
        let store = open_memory();
        store
            .batch_upsert(vec![
                LocalRecord::new("1").with_display_name("A").with_phone("9"),
                LocalRecord::new("2").with_handle("bee"),
            ])
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.table, "patients_ws");
        assert_eq!(stats.records, 2);
        assert_eq!(stats.frames, 1);
        assert_eq!(
            stats.indexes,
            vec![
                (IndexName::Name, 1),
                (IndexName::Phone, 1),
                (IndexName::Handle, 1),
                (IndexName::UpdatedAt, 2),
            ]
        );
    }

    #[test]
    fn compact_merges_frames() {
        let store = open_memory();
        for i in 0..5 {
            store
                .upsert_one(LocalRecord::new("same").with_updated_at(i))
                .unwrap();
        }
        assert_eq!(store.stats().unwrap().frames, 5);

        let reclaimed = store.compact().unwrap();
        assert!(reclaimed > 0);
        let stats = store.stats().unwrap();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.records, 1);
    }
}
