//! # PCache Testkit
//!
//! Test utilities for PCache.
//!
//! This crate provides:
//! - Fixtures: temporary file-backed stores and sample records
//! - Collaborator stubs: a paged bulk fetcher with call and concurrency
//!   counters, and a recording remote search
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pcache_testkit::prelude::*;
//!
//! #[test]
//! fn syncs_three_pages() {
//!     let fetcher = PagedFetcher::with_pages([1000, 1000, 400]);
//!     let store = TestStore::file("clinic");
//!     // ... run a sync against the store
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stubs;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stubs::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stubs::*;
