//! # PCache Storage
//!
//! Byte-level storage backends for the PCache record log.
//!
//! Backends are **opaque byte stores**: the record log in `pcache_core`
//! owns framing, checksums and replay. A backend only reads, appends,
//! truncates and atomically replaces bytes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral caches
//! - [`FileBackend`] - For the persistent on-device cache
//!
//! ## Example
//!
//! ```rust
//! use pcache_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
