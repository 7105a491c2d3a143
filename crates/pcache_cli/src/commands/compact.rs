//! Compact command implementation.

use super::{format_size, open_store};
use std::path::Path;
use tracing::info;

/// Runs the compact command.
pub fn run(path: &Path, workspace: &str, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, workspace)?;
    let before = store.stats()?;

    println!("Compacting {}", before.table);
    println!(
        "  Before: {} records in {} frames, {}",
        before.records,
        before.frames,
        format_size(before.log_bytes)
    );

    if dry_run {
        println!();
        println!("Dry run - no changes made");
        store.close();
        return Ok(());
    }

    info!(workspace, "compacting partition");
    let reclaimed = store.compact()?;
    let after = store.stats()?;
    store.close();

    println!(
        "  After:  {} records in {} frames, {}",
        after.records,
        after.frames,
        format_size(after.log_bytes)
    );
    println!("  Reclaimed {}", format_size(reclaimed));
    Ok(())
}
