//! Verify command implementation.

use pcache_core::{log, PartitionName};
use pcache_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Runs the verify command. The log file is only read.
pub fn run(path: &Path, workspace: &str) -> Result<(), Box<dyn std::error::Error>> {
    let partition = PartitionName::for_workspace(workspace);
    let log_path = partition.log_path(path);

    println!("Verifying {} at {}", partition.as_str(), log_path.display());
    println!();

    if !log_path.exists() {
        println!("Record log not found (the workspace has never been synced)");
        return Ok(());
    }

    let backend = FileBackend::open(&log_path)?;
    let bytes = backend.read_all()?;

    let summary = match log::replay(&bytes, |_| {}) {
        Ok(summary) => summary,
        Err(e) => {
            println!("✗ Record log is corrupted: {e}");
            return Err("Verification failed".into());
        }
    };

    println!("  Frames:       {}", summary.frames);
    println!("  Records:      {}", summary.records);
    println!("  Valid bytes:  {} of {}", summary.valid_len, bytes.len());
    println!();

    if summary.torn_tail {
        println!(
            "✗ Torn tail: {} trailing bytes will be discarded on next open",
            bytes.len() as u64 - summary.valid_len
        );
        Err("Verification failed".into())
    } else {
        println!("✓ Record log verification passed");
        Ok(())
    }
}
