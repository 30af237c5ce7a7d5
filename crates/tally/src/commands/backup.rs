//! Backup command

use anyhow::Result;
use tally_backup::BackupOutcome;

use crate::cli::{BackupArgs, GlobalArgs};
use crate::context::CliContext;
use crate::output;

pub async fn run(args: BackupArgs, globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;

    let outcome = if args.json {
        ctx.repository.create_backup().await
    } else {
        let spinner = output::spinner("Creating snapshot...");
        let outcome = ctx.repository.create_backup().await;
        spinner.finish_and_clear();
        outcome
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        if !outcome.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    match outcome {
        BackupOutcome::Success {
            snapshot,
            duration_ms,
        } => {
            output::success("Backup created");
            output::kv("Snapshot", &snapshot.name);
            output::kv("Size", &snapshot.human_size());
            output::kv("Schema", &format!("v{}", snapshot.schema_version));
            output::kv("Duration", &format!("{:.1}s", duration_ms as f64 / 1000.0));
            Ok(())
        }
        BackupOutcome::Failure {
            kind,
            message,
            cause,
        } => {
            output::error(&format!("Backup failed ({}): {message}", kind.as_str()));
            if let Some(cause) = cause {
                output::kv("cause", &cause);
            }
            std::process::exit(1);
        }
    }
}
