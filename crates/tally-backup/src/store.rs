//! The live-store seam and the shipped journal-file implementation.
//!
//! The subsystem never assumes a database engine; everything it needs from
//! the store goes through [`LiveStore`]. The bundled [`JournalStore`] is a
//! line-delimited JSON store with a header line carrying the schema version
//! and a sidecar write-ahead file merged into the primary on checkpoint. It
//! gives the CLI and the tests real checkpoint, swap, and migration
//! semantics; a SQLite-class store implements the same trait in the host app.

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tally_core::{Error, Result};

/// Extension of the sidecar write-ahead file, appended to the primary name.
pub const WAL_EXTENSION: &str = "wal";

/// Everything the subsystem needs from the relational store.
#[async_trait]
pub trait LiveStore: Send + Sync {
    /// Path of the primary store file; snapshots are byte copies of this.
    fn primary_path(&self) -> &Path;

    /// Schema version of the currently open store.
    async fn schema_version(&self) -> Result<u32>;

    /// Flushes buffered and write-ahead rows into the primary file so a
    /// byte copy reflects every committed write.
    async fn checkpoint(&self) -> Result<()>;

    /// Releases the exclusive handle so the primary file can be swapped.
    /// Idempotent.
    async fn close(&self) -> Result<()>;

    /// Re-acquires the store after a swap, re-reading its header. Idempotent.
    async fn reopen(&self) -> Result<()>;

    /// Brings a store restored at schema `from` up to `to`.
    async fn migrate(&self, from: u32, to: u32) -> Result<()>;

    /// Total committed rows, for restore reports.
    async fn row_count(&self) -> Result<u64>;
}

/// First line of the primary file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Header {
    schema_version: u32,
}

#[derive(Debug)]
struct OpenState {
    /// Holds the exclusive `fs4` lock for as long as the store is open.
    _lock: File,
    schema_version: u32,
}

/// Line-delimited JSON store with a sidecar write-ahead file.
#[derive(Debug)]
pub struct JournalStore {
    primary: PathBuf,
    wal: PathBuf,
    state: Mutex<Option<OpenState>>,
}

impl JournalStore {
    /// Opens (creating if absent, at `initial_version`) and exclusively
    /// locks the store at `path`.
    pub fn open(path: impl Into<PathBuf>, initial_version: u32) -> Result<Self> {
        let primary = path.into();
        let wal = wal_path(&primary);

        if let Some(parent) = primary.parent() {
            fs::create_dir_all(parent)?;
        }
        if !primary.exists() {
            let header = serde_json::to_string(&Header {
                schema_version: initial_version,
            })?;
            fs::write(&primary, format!("{header}\n"))?;
        }

        let store = Self {
            primary,
            wal,
            state: Mutex::new(None),
        };
        store.acquire()?;
        Ok(store)
    }

    /// Appends one row to the write-ahead file. Rows become part of the
    /// primary file at the next checkpoint.
    pub fn append<T: Serialize>(&self, row: &T) -> Result<()> {
        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.is_none() {
                return Err(Error::store_closed(self.primary.display().to_string()));
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.wal)?;
        let line = serde_json::to_string(row)?;
        writeln!(file, "{line}")?;
        file.sync_all()?;
        Ok(())
    }

    /// All committed rows in order: primary body first, then unmerged WAL.
    pub fn read_rows(&self) -> Result<Vec<Value>> {
        let mut rows = read_json_lines(&self.primary)?;
        // Drop the header line.
        if !rows.is_empty() {
            rows.remove(0);
        }
        if self.wal.exists() {
            rows.extend(read_json_lines(&self.wal)?);
        }
        Ok(rows)
    }

    /// Path of the sidecar write-ahead file.
    pub fn wal_path(&self) -> &Path {
        &self.wal
    }

    fn acquire(&self) -> Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(&self.primary)?;
        let acquired = file
            .try_lock_exclusive()
            .map_err(|e| Error::checkpoint_failed(format!("store lock failed: {e}")))?;
        if !acquired {
            return Err(Error::store_locked(self.primary.display().to_string()));
        }

        let schema_version = read_header(&self.primary)?.schema_version;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = Some(OpenState {
            _lock: file,
            schema_version,
        });
        Ok(())
    }

    fn require_open(&self) -> Result<u32> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .as_ref()
            .map(|s| s.schema_version)
            .ok_or_else(|| Error::store_closed(self.primary.display().to_string()))
    }
}

#[async_trait]
impl LiveStore for JournalStore {
    fn primary_path(&self) -> &Path {
        &self.primary
    }

    async fn schema_version(&self) -> Result<u32> {
        self.require_open()
    }

    async fn checkpoint(&self) -> Result<()> {
        self.require_open()?;

        if !self.wal.exists() {
            return Ok(());
        }
        let pending = read_json_lines(&self.wal)
            .map_err(|e| Error::checkpoint_failed(format!("cannot read write-ahead file: {e}")))?;
        if pending.is_empty() {
            fs::remove_file(&self.wal)?;
            return Ok(());
        }

        let mut primary = OpenOptions::new()
            .append(true)
            .open(&self.primary)
            .map_err(|e| Error::checkpoint_failed(format!("cannot open primary file: {e}")))?;
        for row in &pending {
            let line = serde_json::to_string(row)?;
            writeln!(primary, "{line}")
                .map_err(|e| Error::checkpoint_failed(format!("cannot merge row: {e}")))?;
        }
        primary
            .sync_all()
            .map_err(|e| Error::checkpoint_failed(format!("cannot sync primary file: {e}")))?;
        drop(primary);

        fs::remove_file(&self.wal)?;
        tracing::debug!(rows = pending.len(), "checkpoint merged write-ahead rows");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Dropping the handle releases the fs4 lock.
        *state = None;
        Ok(())
    }

    async fn reopen(&self) -> Result<()> {
        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.is_some() {
                return Ok(());
            }
        }
        self.acquire()
    }

    async fn migrate(&self, from: u32, to: u32) -> Result<()> {
        let current = self.require_open()?;
        if current != from {
            return Err(Error::migration(
                from,
                to,
                format!("store header says v{current}, not v{from}"),
            ));
        }
        if from > to {
            return Err(Error::migration(from, to, "downgrade is not supported"));
        }
        if from == to {
            return Ok(());
        }

        // Rewrite the whole file with the new header. The rename invalidates
        // the held lock handle, so release and re-acquire around it.
        let rows = self.read_rows()?;
        let temp_path = self.primary.with_extension("migrate.tmp");
        let mut temp = File::create(&temp_path)?;
        let header = serde_json::to_string(&Header { schema_version: to })?;
        writeln!(temp, "{header}")?;
        for row in &rows {
            writeln!(temp, "{}", serde_json::to_string(row)?)?;
        }
        temp.sync_all()?;
        drop(temp);

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *state = None;
        }
        fs::rename(&temp_path, &self.primary)?;
        if self.wal.exists() {
            fs::remove_file(&self.wal)?;
        }
        self.acquire()?;

        tracing::info!(from, to, "store migrated");
        Ok(())
    }

    async fn row_count(&self) -> Result<u64> {
        self.require_open()?;
        Ok(self.read_rows()?.len() as u64)
    }
}

/// Sidecar WAL path for a primary store path.
pub fn wal_path(primary: &Path) -> PathBuf {
    let mut name = primary.as_os_str().to_os_string();
    name.push(".");
    name.push(WAL_EXTENSION);
    PathBuf::from(name)
}

fn read_header(path: &Path) -> Result<Header> {
    let file = File::open(path)?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line)?;
    let header: Header = serde_json::from_str(first_line.trim())?;
    Ok(header)
}

fn read_json_lines(path: &Path) -> Result<Vec<Value>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(&line)?);
    }
    Ok(rows)
}
