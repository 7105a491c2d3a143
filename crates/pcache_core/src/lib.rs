//! # PCache Core
//!
//! The on-device half of the hybrid patient search cache.
//!
//! This crate provides:
//! - [`LocalRecord`], the minimal cached projection of a remote patient
//! - [`LocalStore`], a workspace-scoped persistent table with secondary
//!   indexes and the prefix-scan search policy
//! - The record log: CBOR batch frames with CRC32 checksums, replayed on open
//! - [`IncrementalUpdateMerger`], best-effort cache maintenance after CRUD calls
//! - The collaborator traits the cache consumes ([`RemotePageFetcher`],
//!   [`RemoteSearch`]) and the shared [`CacheError`] taxonomy
//!
//! ## Key Invariants
//!
//! - A store is bound to exactly one workspace; partitions never intermix
//! - One `batch_upsert` is one log frame, so a batch lands whole or not at all
//! - `scan_prefix` is a linear scan in primary-key order that stops at `limit`
//! - The cache is an accelerator, never the source of truth

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod log;
mod merge;
mod partition;
mod record;
mod remote;
mod store;
mod table;

pub use config::{StoreConfig, StoreLocation};
pub use error::{CacheError, CacheResult};
pub use merge::IncrementalUpdateMerger;
pub use partition::PartitionName;
pub use record::{now_millis, ExtraField, ExtraFields, LocalRecord, RecordUpdate};
pub use remote::{MinifiedRecord, PatientFields, RemotePageFetcher, RemoteSearch};
pub use store::{LocalStore, StoreStats};
pub use table::{IndexName, PrefixKind};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
