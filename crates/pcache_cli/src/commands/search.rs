//! Search command implementation.

use super::open_store;
use std::path::Path;

/// Runs a local prefix search.
pub fn run(
    path: &Path,
    workspace: &str,
    prefix: &str,
    limit: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if prefix.is_empty() {
        return Err("Prefix must not be empty".into());
    }

    let store = open_store(path, workspace)?;
    let found = store.scan_prefix(prefix, limit)?;
    store.close();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    println!("{} match(es) for {prefix:?}", found.len());
    for record in &found {
        println!(
            "  {:<20} {:<24} {:<14} {}",
            record.id,
            record.display_name.as_deref().unwrap_or("-"),
            record.phone.as_deref().unwrap_or("-"),
            record.handle.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
