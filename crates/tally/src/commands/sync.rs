//! Sync command

use anyhow::Result;
use tally_backup::{BackupOutcome, SyncSlot};

use crate::cli::{GlobalArgs, SyncArgs};
use crate::context::CliContext;
use crate::output;

pub async fn run(args: SyncArgs, globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;

    if !ctx.repository.settings()?.cloud_sync_enabled {
        output::warning("Cloud sync is off in settings; a manual sync runs anyway");
    }

    let slot = match args.name {
        Some(label) => SyncSlot::Named { label },
        None => SyncSlot::Timestamped,
    };

    let spinner = output::spinner("Syncing to cloud...");
    let watcher = output::transfer_watcher(ctx.repository.sync_status(), spinner.clone());
    let outcome = ctx.repository.sync_now(slot).await;
    watcher.abort();
    spinner.finish_and_clear();

    match outcome {
        BackupOutcome::Success {
            snapshot,
            duration_ms,
        } => {
            output::success("Synced to cloud");
            output::kv("Snapshot", &snapshot.name);
            output::kv("Size", &snapshot.human_size());
            output::kv("Duration", &format!("{:.1}s", duration_ms as f64 / 1000.0));
            Ok(())
        }
        BackupOutcome::Failure {
            kind,
            message,
            cause,
        } => {
            output::error(&format!("Sync failed ({}): {message}", kind.as_str()));
            if let Some(cause) = cause {
                output::kv("cause", &cause);
            }
            std::process::exit(1);
        }
    }
}
