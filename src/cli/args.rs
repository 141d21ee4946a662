//! CLI argument definitions using clap
//!
//! Commands:
//! - stepmigrate up [TARGET] [--rerun]
//! - stepmigrate status
//! - stepmigrate version
//! - stepmigrate create --name <name>
//! - stepmigrate backups <list|prune>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// stepmigrate - ordered, reversible, version-tracked database migrations
#[derive(Parser, Debug)]
#[command(name = "stepmigrate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (default: ./stepmigrate.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Version store collection name, overrides the config file
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Log filter directive; STEPMIGRATE_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Include the module path in log lines
    #[arg(long, global = true)]
    pub log_target: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate to a version (default: the latest registered one)
    ///
    /// TARGET is `<version>` or `<version>,rerun`, e.g. `1.2`, `0`, `1.1,rerun`.
    Up(UpArgs),

    /// Show current, applied and pending migrations
    Status,

    /// Show the version record
    Version,

    /// Create the next migration unit
    Create {
        /// Name for the migration (will be sanitized)
        #[arg(long)]
        name: String,
    },

    /// Manage pre-migration backups
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },
}

#[derive(Args, Debug, Default)]
pub struct UpArgs {
    /// Target version
    pub target: Option<String>,

    /// Re-run the target's 'up' even if it is the current version
    #[arg(long)]
    pub rerun: bool,

    /// Take a backup before migrating
    #[arg(long, conflicts_with = "no_backup")]
    pub backup: bool,

    /// Skip the backup even if the config enables it
    #[arg(long)]
    pub no_backup: bool,

    /// Do not log when the target is already reached
    #[arg(long)]
    pub quiet_latest: bool,
}

impl UpArgs {
    /// `Some(enabled)` when a flag overrides the config file
    pub fn backup_override(&self) -> Option<bool> {
        match (self.backup, self.no_backup) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum BackupsAction {
    /// List archives, newest first
    List,

    /// Delete archives beyond backup.max_archives
    Prune,
}
