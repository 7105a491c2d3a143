//! Error taxonomy shared by every PCache crate.

use pcache_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur anywhere in the cache.
///
/// Callers dispatch on the variant. Configuration and not-initialized
/// problems are programmer errors and always surface; sync problems are
/// delivered through sync callbacks; local cache failures during search
/// and incremental maintenance are logged and swallowed.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Missing or invalid SDK configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration.
        message: String,
    },

    /// A required call parameter was empty or missing.
    #[error("missing required parameter: {name}")]
    MissingParameter {
        /// Name of the parameter.
        name: &'static str,
    },

    /// The store was used before `init()` or after `close()`.
    #[error("local store for workspace {workspace} is not initialized")]
    NotInitialized {
        /// Workspace the store is bound to.
        workspace: String,
    },

    /// A sync run is already active.
    #[error("a sync run is already in progress")]
    Busy,

    /// A partial merge targeted a record that does not exist.
    #[error("record not found: {id}")]
    NotFound {
        /// Identifier that was looked up.
        id: String,
    },

    /// The sync run was cancelled.
    #[error("sync aborted after {synced} records")]
    Aborted {
        /// Records committed before the run stopped.
        synced: u64,
    },

    /// Local search was requested before the first sync completed.
    #[error("local cache is still syncing; retry later or force a remote search")]
    StillSyncing,

    /// The local cache failed while serving a query.
    #[error("local cache unavailable: {message}")]
    TransientCache {
        /// Description of the failure.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error outside the storage backend (lock files, directories).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The record log holds a checksummed frame that cannot be decoded.
    #[error("record log corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Another handle holds the partition lock.
    #[error("workspace partition {workspace} is locked by another handle")]
    Locked {
        /// Workspace whose partition is locked.
        workspace: String,
    },

    /// A remote collaborator failed.
    #[error("remote error: {message}")]
    Remote {
        /// Human-readable message.
        message: String,
        /// HTTP-style status code, when the collaborator has one.
        status: Option<u16>,
        /// Structured error body, when the collaborator has one.
        payload: Option<serde_json::Value>,
    },

    /// A background sync run failed; only the message crosses the worker boundary.
    #[error("sync failed: {message}")]
    SyncFailed {
        /// Message relayed from the worker.
        message: String,
    },

    /// A worker message could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl CacheError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a corrupted-log error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a remote error without status or payload.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    /// Creates a remote error carrying a status code.
    pub fn remote_status(message: impl Into<String>, status: u16) -> Self {
        Self::Remote {
            message: message.into(),
            status: Some(status),
            payload: None,
        }
    }

    /// Returns the status code attached to this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CacheError::Remote { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the structured payload attached to this error, if any.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            CacheError::Remote { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// Returns true if this is a failure of the local cache itself.
    ///
    /// These are the failures the search router hides behind a remote
    /// fallback.
    pub fn is_local_failure(&self) -> bool {
        matches!(
            self,
            CacheError::NotInitialized { .. }
                | CacheError::TransientCache { .. }
                | CacheError::Storage(_)
                | CacheError::Io(_)
                | CacheError::Codec(_)
                | CacheError::Corrupted { .. }
                | CacheError::Locked { .. }
        )
    }
}
