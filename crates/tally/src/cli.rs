//! CLI argument parsing with clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// Tally - backup, restore, and cloud sync for your tracker data
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Data placement and remote connection flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Data directory holding the store and snapshots
    #[arg(long, env = "TALLY_DATA_DIR", global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the remote sync service
    #[arg(long, env = "TALLY_REMOTE_URL", global = true, value_name = "URL")]
    pub remote_url: Option<String>,

    /// Bearer token for the remote sync service
    #[arg(
        long,
        env = "TALLY_REMOTE_TOKEN",
        global = true,
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub remote_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a local snapshot now
    Backup(BackupArgs),

    /// List snapshots, newest first
    List(ListArgs),

    /// Delete local snapshots
    Delete(DeleteArgs),

    /// Restore a snapshot over the live store
    Restore(RestoreArgs),

    /// Upload a fresh snapshot to the cloud now
    Sync(SyncArgs),

    /// Re-verify every local snapshot against its checksum
    Verify,

    /// Show settings, snapshot counts, and sync state
    Status(StatusArgs),

    /// Change backup settings
    Settings(SettingsArgs),
}

// Backup command
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Output the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

// List command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// List remote snapshots instead of local ones
    #[arg(long)]
    pub remote: bool,

    /// List local and remote snapshots together
    #[arg(long, conflicts_with = "remote")]
    pub all: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Delete command
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Snapshot filename to delete
    #[arg(required_unless_present = "all")]
    pub name: Option<String>,

    /// Delete every local snapshot
    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

// Restore command
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Snapshot filename to restore
    pub name: String,

    /// Validate only; leave the store untouched
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

// Sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Keep the uploaded snapshot under a named label, exempt from remote
    /// retention
    #[arg(long, value_name = "LABEL")]
    pub name: Option<String>,
}

// Status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Settings command
#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Turn automatic local backups on or off
    #[arg(long, value_name = "on|off")]
    pub local_backups: Option<Toggle>,

    /// Turn scheduled cloud sync on or off
    #[arg(long, value_name = "on|off")]
    pub cloud_sync: Option<Toggle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Toggle::On => "on",
            Toggle::Off => "off",
        })
    }
}
