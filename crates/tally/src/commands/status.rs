//! Status command

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_backup::{BackupSettings, SyncStatus};
use tally_core::human_bytes;

use crate::cli::{GlobalArgs, StatusArgs};
use crate::context::CliContext;
use crate::output;

#[derive(Serialize)]
struct StatusView<'a> {
    data_dir: String,
    settings: &'a BackupSettings,
    sync: &'a SyncStatus,
}

pub async fn run(args: StatusArgs, globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;
    let settings = ctx.repository.settings()?;
    let status_rx = ctx.repository.sync_status();
    let sync = status_rx.borrow().clone();

    if args.json {
        let view = StatusView {
            data_dir: ctx.data_dir.display().to_string(),
            settings: &settings,
            sync: &sync,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    output::header("Backup Status");
    output::kv("Data directory", &ctx.data_dir.display().to_string());
    output::kv("Local backups", enabled_str(settings.local_backups_enabled));
    output::kv("Cloud sync", enabled_str(settings.cloud_sync_enabled));
    output::kv(
        "Account",
        settings.account.as_deref().unwrap_or("signed out"),
    );
    output::kv(
        "Remote",
        globals.remote_url.as_deref().unwrap_or("not configured"),
    );

    output::header("Snapshots");
    output::kv(
        "Local",
        &format!(
            "{} ({})",
            settings.local_snapshot_count,
            human_bytes(settings.local_snapshot_bytes)
        ),
    );
    output::kv(
        "Remote",
        &format!(
            "{} ({})",
            settings.remote_snapshot_count,
            human_bytes(settings.remote_snapshot_bytes)
        ),
    );
    output::kv("Last local backup", &stamp(settings.last_local_backup));
    output::kv("Last cloud sync", &stamp(settings.last_cloud_sync));
    output::kv("Sync status", &sync.to_string());

    Ok(())
}

fn enabled_str(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

fn stamp(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".to_string(),
    }
}
