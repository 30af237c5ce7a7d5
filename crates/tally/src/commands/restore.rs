//! Restore command

use anyhow::Result;
use dialoguer::Confirm;
use tally_backup::RestoreOutcome;

use crate::cli::{GlobalArgs, RestoreArgs};
use crate::context::CliContext;
use crate::output;

pub async fn run(args: RestoreArgs, globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;

    if args.dry_run {
        let plan = ctx.repository.dry_run_restore(&args.name).await?;

        output::header("Restore Plan");
        output::kv("Source", &plan.source.name);
        output::kv("Location", plan.source.location.as_str());
        output::kv("Size", &plan.source.human_size());
        output::kv(
            "Schema",
            &format!(
                "v{} (current v{})",
                plan.compatibility.snapshot_version, plan.compatibility.current_version
            ),
        );
        if plan.compatibility.needs_migration() {
            output::warning("Restore will migrate the store to the current schema");
        }
        println!();
        output::success("Validation passed, nothing was changed");
        return Ok(());
    }

    if !args.yes {
        let proceed = Confirm::new()
            .with_prompt(format!("Replace the current data with {}?", args.name))
            .default(false)
            .interact()?;
        if !proceed {
            output::info("Restore cancelled");
            return Ok(());
        }
    }

    let spinner = output::spinner("Restoring...");
    let watcher = output::transfer_watcher(ctx.repository.sync_status(), spinner.clone());
    let outcome = ctx.repository.restore(&args.name).await;
    watcher.abort();
    spinner.finish_and_clear();

    match outcome {
        RestoreOutcome::Success {
            items_restored,
            source,
            duration_ms,
        } => {
            output::success("Restore complete");
            output::kv("Source", &source.name);
            output::kv("Location", source.location.as_str());
            output::kv("Items", &items_restored.to_string());
            output::kv("Duration", &format!("{:.1}s", duration_ms as f64 / 1000.0));
            output::info("The replaced data was kept as a safety snapshot");
            Ok(())
        }
        RestoreOutcome::Failure {
            kind,
            message,
            cause,
        } => {
            output::error(&format!("Restore failed ({}): {message}", kind.as_str()));
            if let Some(cause) = cause {
                output::kv("cause", &cause);
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::BackupArgs;
    use tally_backup::BACKUP_DIR_NAME;
    use tempfile::TempDir;

    fn offline_globals(dir: &TempDir) -> GlobalArgs {
        GlobalArgs {
            data_dir: Some(dir.path().to_path_buf()),
            remote_url: None,
            remote_token: None,
        }
    }

    #[tokio::test]
    async fn test_restore_round_trip_keeps_safety_snapshot() {
        let dir = TempDir::new().unwrap();
        let globals = offline_globals(&dir);
        crate::commands::backup::run(BackupArgs { json: true }, &globals)
            .await
            .unwrap();

        let name = std::fs::read_dir(dir.path().join(BACKUP_DIR_NAME))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .find(|n| n.ends_with(".snapshot"))
            .unwrap();

        run(
            RestoreArgs {
                name,
                dry_run: false,
                yes: true,
            },
            &globals,
        )
        .await
        .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join(BACKUP_DIR_NAME))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.contains("_prerestore.snapshot")));
    }

    #[tokio::test]
    async fn test_dry_run_reports_plan_without_changes() {
        let dir = TempDir::new().unwrap();
        let globals = offline_globals(&dir);
        crate::commands::backup::run(BackupArgs { json: true }, &globals)
            .await
            .unwrap();

        let backup_dir = dir.path().join(BACKUP_DIR_NAME);
        let before = std::fs::read_dir(&backup_dir).unwrap().count();
        let name = std::fs::read_dir(&backup_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .find(|n| n.ends_with(".snapshot"))
            .unwrap();

        run(
            RestoreArgs {
                name,
                dry_run: true,
                yes: false,
            },
            &globals,
        )
        .await
        .unwrap();

        // No safety snapshot, no new files.
        assert_eq!(std::fs::read_dir(&backup_dir).unwrap().count(), before);
    }
}
