//! CLI command implementations.

pub mod clear;
pub mod compact;
pub mod inspect;
pub mod search;
pub mod verify;

use pcache_core::{LocalStore, StoreConfig};
use std::path::Path;

/// Opens the workspace's partition under `path`.
pub(crate) fn open_store(
    path: &Path,
    workspace: &str,
) -> Result<LocalStore, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("Cache directory not found: {}", path.display()).into());
    }
    let store = LocalStore::new(workspace, StoreConfig::in_dir(path))?;
    store.init()?;
    Ok(store)
}

/// Formats a byte count for display.
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}
