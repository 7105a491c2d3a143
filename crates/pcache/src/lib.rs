//! # PCache
//!
//! A hybrid local/remote patient search cache.
//!
//! A [`PatientCache`] mirrors a workspace's patient directory into an
//! on-device store with a full paginated resync, keeps it fresh with
//! incremental updates from CRUD responses, and answers prefix searches
//! from the local copy once a sync has completed, falling back to the
//! remote search service otherwise.
//!
//! ## Search policy
//!
//! - An empty prefix is rejected
//! - Before the first sync completes, local searches fail with
//!   [`CacheError::StillSyncing`] unless the caller forces a remote search
//! - All-digit prefixes match phone numbers or handles; anything else
//!   matches display names or handles, case-insensitively
//! - A failing local cache is logged and bypassed in favour of remote search
//!
//! ## Crates
//!
//! - `pcache_storage`: byte-level storage backends
//! - `pcache_core`: record model, local store, record log, merger
//! - `pcache_sync`: sync engine, worker protocol, dispatcher

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod router;
mod sdk;

pub use config::SdkConfig;
pub use router::{SearchResults, SearchRouter};
pub use sdk::PatientCache;

pub use pcache_core::{
    CacheError, CacheResult, ExtraField, ExtraFields, LocalRecord, MinifiedRecord,
    PatientFields, RemotePageFetcher, RemoteSearch, StoreConfig, StoreStats,
};
pub use pcache_sync::{
    ExecutionMode, SyncCallbacks, SyncProgress, SyncState, SyncStatus, SyncTracker, ThreadHost,
    WorkerHost,
};
