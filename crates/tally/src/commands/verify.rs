//! Verify command

use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};
use tally_backup::SnapshotStatus;

use crate::cli::GlobalArgs;
use crate::context::CliContext;
use crate::output;

#[derive(Tabled)]
struct VerifyRow {
    name: String,
    size: String,
    status: String,
}

pub async fn run(globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;

    let spinner = output::spinner("Verifying snapshots...");
    let snapshots = ctx.repository.verify_backups().await?;
    spinner.finish_and_clear();

    if snapshots.is_empty() {
        output::info("No snapshots to verify");
        return Ok(());
    }

    let rows: Vec<VerifyRow> = snapshots
        .iter()
        .map(|s| VerifyRow {
            name: s.name.clone(),
            size: s.human_size(),
            status: s.status.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");

    let corrupted = snapshots
        .iter()
        .filter(|s| s.status != SnapshotStatus::Available)
        .count();
    if corrupted > 0 {
        output::error(&format!("{corrupted} snapshot(s) failed verification"));
        std::process::exit(1);
    }

    output::success(&format!("All {} snapshot(s) verified", snapshots.len()));
    Ok(())
}
