//! PCache CLI
//!
//! Command-line tools for inspecting and maintaining cache partitions.
//!
//! # Commands
//!
//! - `inspect` - Display partition statistics
//! - `search` - Run a prefix search against the cached records
//! - `verify` - Check the record log without modifying it
//! - `compact` - Rewrite the record log to reclaim space
//! - `clear` - Delete every cached record of a workspace

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PCache command-line cache tools.
#[derive(Parser)]
#[command(name = "pcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Workspace whose partition to open
    #[arg(global = true, short, long)]
    workspace: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display partition statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Search cached records by prefix
    Search {
        /// Name, handle or phone prefix
        prefix: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify record log integrity
    Verify,

    /// Compact the record log
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Delete every cached record of the workspace
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("PCache CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("PCache Core v{}", pcache_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Cache path required")?;
    let workspace = cli.workspace.ok_or("Workspace id required")?;

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&path, &workspace, &format)?,
        Commands::Search {
            prefix,
            limit,
            format,
        } => commands::search::run(&path, &workspace, &prefix, limit, &format)?,
        Commands::Verify => commands::verify::run(&path, &workspace)?,
        Commands::Compact { dry_run } => commands::compact::run(&path, &workspace, dry_run)?,
        Commands::Clear { yes } => commands::clear::run(&path, &workspace, yes)?,
        Commands::Version => {}
    }

    Ok(())
}
