//! Settings command

use anyhow::Result;

use crate::cli::{GlobalArgs, SettingsArgs};
use crate::context::CliContext;
use crate::output;

pub async fn run(args: SettingsArgs, globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;

    let mut settings = ctx.repository.settings()?;
    if let Some(toggle) = args.local_backups {
        settings = ctx.repository.set_local_backups_enabled(toggle.enabled())?;
        output::success(&format!("Local backups turned {toggle}"));
    }
    if let Some(toggle) = args.cloud_sync {
        settings = ctx.repository.set_cloud_sync_enabled(toggle.enabled())?;
        output::success(&format!("Cloud sync turned {toggle}"));
    }

    output::kv("Local backups", enabled_str(settings.local_backups_enabled));
    output::kv("Cloud sync", enabled_str(settings.cloud_sync_enabled));
    Ok(())
}

fn enabled_str(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Toggle;
    use tally_backup::{JsonSettingsStore, SettingsStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_toggles_persist_to_settings_file() {
        let dir = TempDir::new().unwrap();
        let globals = GlobalArgs {
            data_dir: Some(dir.path().to_path_buf()),
            remote_url: None,
            remote_token: None,
        };

        run(
            SettingsArgs {
                local_backups: Some(Toggle::Off),
                cloud_sync: Some(Toggle::On),
            },
            &globals,
        )
        .await
        .unwrap();

        let store = JsonSettingsStore::in_dir(dir.path());
        let settings = store.load().unwrap();
        assert!(!settings.local_backups_enabled);
        assert!(settings.cloud_sync_enabled);
    }
}
