//! Delete command

use anyhow::Result;
use dialoguer::Confirm;

use crate::cli::{DeleteArgs, GlobalArgs};
use crate::context::CliContext;
use crate::output;

pub async fn run(args: DeleteArgs, globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;

    if args.all {
        if !args.yes {
            let confirmed = Confirm::new()
                .with_prompt("Delete every local snapshot?")
                .default(false)
                .interact()?;
            if !confirmed {
                output::info("Nothing deleted");
                return Ok(());
            }
        }

        let removed = ctx.repository.delete_all_backups().await?;
        output::success(&format!("Deleted {removed} snapshot(s)"));
        return Ok(());
    }

    let Some(name) = args.name.as_deref() else {
        return Err(anyhow::anyhow!("snapshot name required unless --all is given"));
    };

    ctx.repository.delete_backup(name).await?;
    output::success(&format!("Deleted {name}"));
    Ok(())
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

    fn snapshot_names(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path().join(BACKUP_DIR_NAME))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".snapshot"))
            .collect()
    }

    #[tokio::test]
    async fn test_delete_single_by_name() {
        let dir = TempDir::new().unwrap();
        let globals = offline_globals(&dir);
        crate::commands::backup::run(BackupArgs { json: true }, &globals)
            .await
            .unwrap();

        let name = snapshot_names(&dir).pop().unwrap();
        run(
            DeleteArgs {
                name: Some(name),
                all: false,
                yes: false,
            },
            &globals,
        )
        .await
        .unwrap();

        assert!(snapshot_names(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_skips_prompt_with_yes() {
        let dir = TempDir::new().unwrap();
        let globals = offline_globals(&dir);
        crate::commands::backup::run(BackupArgs { json: true }, &globals)
            .await
            .unwrap();
        assert_eq!(snapshot_names(&dir).len(), 1);

        run(
            DeleteArgs {
                name: None,
                all: true,
                yes: true,
            },
            &globals,
        )
        .await
        .unwrap();

        let remaining = std::fs::read_dir(dir.path().join(BACKUP_DIR_NAME))
            .unwrap()
            .count();
        assert_eq!(remaining, 0);
    }
}
