//! Configuration for sync runs and the dispatcher.

use pcache_core::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Parameters of one sync run.
///
/// Travels to the worker inside the `start` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunConfig {
    /// Workspace being synced.
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    /// Records requested per page.
    #[serde(rename = "pageSize")]
    pub page_size: u32,
}

impl SyncRunConfig {
    /// Creates a run configuration with the default page size.
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Checks that the run can be started.
    pub fn validate(&self) -> CacheResult<()> {
        if self.page_size == 0 {
            return Err(CacheError::configuration("sync page size must be at least 1"));
        }
        if self.workspace_id.trim().is_empty() {
            return Err(CacheError::configuration("sync requires a workspace id"));
        }
        Ok(())
    }
}

/// Configuration for a [`crate::SyncDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Records requested per page.
    pub page_size: u32,
    /// Whether to prefer a background worker when a host is available.
    pub background: bool,
}

impl DispatcherConfig {
    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets whether to prefer a background worker.
    #[must_use]
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            background: true,
        }
    }
}
