//! Clear command implementation.

use super::open_store;
use std::path::Path;
use tracing::info;

/// Runs the clear command.
pub fn run(path: &Path, workspace: &str, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !yes {
        return Err("Refusing to clear without --yes".into());
    }

    let store = open_store(path, workspace)?;
    let removed = store.count()?;
    info!(workspace, removed, "clearing partition");
    store.clear()?;
    store.close();

    println!("Cleared {removed} record(s) from workspace {workspace}");
    Ok(())
}
