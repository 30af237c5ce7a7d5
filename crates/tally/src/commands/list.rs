//! List command

use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};
use tally_backup::Snapshot;

use crate::cli::{GlobalArgs, ListArgs};
use crate::context::CliContext;
use crate::output;

#[derive(Tabled)]
struct SnapshotRow {
    name: String,
    location: String,
    created: String,
    size: String,
    schema: String,
    kind: String,
    status: String,
}

impl SnapshotRow {
    fn from_snapshot(s: &Snapshot) -> Self {
        Self {
            name: s.name.clone(),
            location: s.location.to_string(),
            created: s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: s.human_size(),
            schema: format!("v{}", s.schema_version),
            kind: s.kind.to_string(),
            status: s.status.to_string(),
        }
    }
}

pub async fn run(args: ListArgs, globals: &GlobalArgs) -> Result<()> {
    let ctx = CliContext::open(globals).await?;

    let mut snapshots = Vec::new();
    if !args.remote {
        snapshots.extend(ctx.repository.list_local().await?);
    }
    if args.remote || args.all {
        snapshots.extend(ctx.repository.list_remote().await);
    }
    snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    if snapshots.is_empty() {
        output::info("No snapshots found");
        return Ok(());
    }

    let rows: Vec<SnapshotRow> = snapshots.iter().map(SnapshotRow::from_snapshot).collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_backup::{SnapshotLocation, SnapshotName};

    #[test]
    fn test_row_formatting() {
        let name = "tally_v3_20250102_083015_keeper.snapshot";
        let parsed = SnapshotName::parse(name).unwrap();
        let snapshot =
            Snapshot::from_name(&parsed, name, SnapshotLocation::Local, 2048, "ab".repeat(32));

        let row = SnapshotRow::from_snapshot(&snapshot);
        assert_eq!(row.name, name);
        assert_eq!(row.location, "local");
        assert_eq!(row.created, "2025-01-02 08:30:15");
        assert_eq!(row.size, "2.00 KB");
        assert_eq!(row.schema, "v3");
        assert_eq!(row.kind, "named");
        assert_eq!(row.status, "available");
    }
}
