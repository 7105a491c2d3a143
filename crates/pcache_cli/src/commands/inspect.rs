//! Inspect command implementation.

use super::{format_size, open_store};
use serde::Serialize;
use std::path::Path;

/// Partition summary as printed by `inspect`.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Workspace id.
    pub workspace: String,
    /// Partition (table) name.
    pub table: String,
    /// Live records.
    pub records: usize,
    /// Frames in the record log.
    pub frames: usize,
    /// Record log size in bytes.
    pub log_bytes: u64,
    /// Newest `updatedAt` across records.
    pub latest_updated_at: i64,
    /// Entries per secondary index.
    pub indexes: Vec<IndexInfo>,
}

/// One secondary index line.
#[derive(Debug, Serialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: &'static str,
    /// Entry count.
    pub entries: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, workspace: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, workspace)?;
    let stats = store.stats()?;
    store.close();

    let result = InspectResult {
        workspace: stats.workspace_id,
        table: stats.table,
        records: stats.records,
        frames: stats.frames,
        log_bytes: stats.log_bytes,
        latest_updated_at: stats.latest_updated_at,
        indexes: stats
            .indexes
            .into_iter()
            .map(|(name, entries)| IndexInfo {
                name: name.as_str(),
                entries,
            })
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(path, &result),
    }

    Ok(())
}

fn print_text(path: &Path, result: &InspectResult) {
    println!("PCache Partition Inspection");
    println!("===========================");
    println!();
    println!("Directory: {}", path.display());
    println!("Workspace: {}", result.workspace);
    println!("Table:     {}", result.table);
    println!();
    println!("Records:   {}", result.records);
    println!(
        "Log:       {} frames, {}",
        result.frames,
        format_size(result.log_bytes)
    );
    println!("Latest:    {}", result.latest_updated_at);
    println!();
    println!("Indexes:");
    for index in &result.indexes {
        println!("  {:<10} {}", index.name, index.entries);
    }
}
