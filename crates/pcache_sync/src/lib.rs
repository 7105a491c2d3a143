//! # PCache Sync
//!
//! Full resynchronization of a workspace's local cache.
//!
//! This crate provides:
//! - Sync state tracking (idle → running → complete | error)
//! - [`SyncEngine`], which pages through the remote bulk endpoint and
//!   writes each page to the [`pcache_core::LocalStore`] as one batch
//! - The worker message protocol (CBOR frames)
//! - [`SyncDispatcher`], which runs the engine on a background worker or
//!   in-process and enforces a single active run
//!
//! ## Key Invariants
//!
//! - At most one sync run is active per dispatcher
//! - A full resync always starts from page 1
//! - Cancellation is cooperative and only checked between page fetches;
//!   a page that was already fetched is committed
//! - The worker and the caller share nothing but serialized messages and
//!   the persistent store

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod dispatcher;
mod engine;
mod protocol;
mod state;

pub use cancel::{CancelCheck, CancellationToken};
pub use config::{DispatcherConfig, SyncRunConfig, DEFAULT_PAGE_SIZE};
pub use dispatcher::{ExecutionMode, SyncCallbacks, SyncDispatcher, ThreadHost, WorkerHost};
pub use engine::{SyncEngine, SyncProgress, SyncReport};
pub use protocol::WorkerMessage;
pub use state::{SyncState, SyncStatus, SyncTracker};
