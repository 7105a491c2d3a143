//! Sync state tracking.

use parking_lot::RwLock;
use pcache_core::{CacheError, CacheResult};

/// Lifecycle of the workspace's full sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No run has started since the cache was opened or cleared.
    #[default]
    Idle,
    /// A run is active.
    Running,
    /// The last run finished successfully; local search is allowed.
    Complete,
    /// The last run failed or was aborted.
    Error,
}

impl SyncState {
    /// Returns true while a run is active.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Running)
    }

    /// Returns true if a new run may start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }

    /// Lowercase name for logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Running => "running",
            SyncState::Complete => "complete",
            SyncState::Error => "error",
        }
    }
}

/// Snapshot of the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current state.
    pub state: SyncState,
    /// Records committed by the current or last run.
    pub records_synced: u64,
    /// Epoch milliseconds of the last successful run.
    pub last_completed_at: Option<i64>,
    /// Message of the last failure.
    pub last_error: Option<String>,
    /// Number of runs that completed successfully.
    pub runs_completed: u64,
}

/// Shared sync state, read by the search gate and written by whichever
/// context relays run events.
#[derive(Debug, Default)]
pub struct SyncTracker {
    status: RwLock<SyncStatus>,
}

impl SyncTracker {
    /// Creates an idle tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.status.read().state
    }

    /// Gets a snapshot of the full status.
    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    /// Returns true once a run has completed and no later run is active.
    pub fn is_complete(&self) -> bool {
        self.state() == SyncState::Complete
    }

    /// Marks a run as started.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Busy`] if a run is already active.
    pub fn begin(&self) -> CacheResult<()> {
        let mut status = self.status.write();
        if !status.state.can_start_sync() {
            return Err(CacheError::Busy);
        }
        status.state = SyncState::Running;
        status.records_synced = 0;
        status.last_error = None;
        Ok(())
    }

    /// Records the cumulative number of committed records.
    pub fn record_progress(&self, records: u64) {
        self.status.write().records_synced = records;
    }

    /// Marks the active run as finished successfully at `completed_at`.
    pub fn complete(&self, completed_at: i64) {
        let mut status = self.status.write();
        status.state = SyncState::Complete;
        status.last_completed_at = Some(completed_at);
        status.runs_completed += 1;
    }

    /// Marks the active run as failed.
    pub fn fail(&self, error: &CacheError) {
        let mut status = self.status.write();
        status.state = SyncState::Error;
        status.last_error = Some(error.to_string());
    }

    /// Forgets previous runs after the cache was cleared.
    ///
    /// An active run keeps its state; only its counter restarts.
    pub fn reset(&self) {
        let mut status = self.status.write();
        status.records_synced = 0;
        if !status.state.is_active() {
            *status = SyncStatus::default();
        }
    }
}
