//! Repository wiring for the CLI process.
//!
//! Resolves the data directory, opens the journal store, and builds the
//! repository with CLI-flavored collaborators: identity derived from the
//! remote token, workstation device conditions, and a stub remote when no
//! sync service is configured.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_backup::{
    BackupRepository, DeviceConditions, HttpRemoteStore, IdentityProvider, JournalStore,
    JsonSettingsStore, LiveStore, RemoteObject, RemoteStore, TransferProgress,
};
use tally_core::Error;
use tracing::debug;

use crate::cli::GlobalArgs;

/// Schema version of the store this binary writes.
pub const SCHEMA_VERSION: u32 = 3;

/// Primary store filename inside the data directory.
pub const STORE_FILENAME: &str = "tally.db";

pub struct CliContext {
    pub repository: BackupRepository,
    pub data_dir: PathBuf,
}

impl CliContext {
    /// Opens the store and the repository under the resolved data directory.
    pub async fn open(globals: &GlobalArgs) -> Result<Self> {
        let data_dir = resolve_data_dir(globals)?;
        let store: Arc<dyn LiveStore> = Arc::new(JournalStore::open(
            data_dir.join(STORE_FILENAME),
            SCHEMA_VERSION,
        )?);

        let remote: Arc<dyn RemoteStore> = match &globals.remote_url {
            Some(url) => {
                debug!(url = %url, "using remote sync service");
                let mut http = HttpRemoteStore::new(url)?;
                if let Some(token) = &globals.remote_token {
                    http = http.with_token(token);
                }
                Arc::new(http)
            }
            None => {
                debug!("no remote URL configured");
                Arc::new(UnconfiguredRemote)
            }
        };

        let identity = Arc::new(EnvIdentity {
            token: globals.remote_token.clone(),
        });
        let settings = Arc::new(JsonSettingsStore::in_dir(&data_dir));

        let repository = BackupRepository::open(
            &data_dir,
            store,
            remote,
            identity,
            Arc::new(WorkstationConditions),
            settings,
        )
        .await?;

        Ok(Self {
            repository,
            data_dir,
        })
    }
}

/// Flag wins over environment; the shared default is `~/.tally`.
fn resolve_data_dir(globals: &GlobalArgs) -> Result<PathBuf> {
    match &globals.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => tally_core::data_dir(),
    }
}

/// Identity derived from the remote token: holding a token means signed in.
pub struct EnvIdentity {
    token: Option<String>,
}

impl IdentityProvider for EnvIdentity {
    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// A workstation on mains power; device constraints never block here.
pub struct WorkstationConditions;

impl DeviceConditions for WorkstationConditions {
    fn network_unmetered(&self) -> bool {
        true
    }

    fn charging(&self) -> bool {
        true
    }

    fn battery_low(&self) -> bool {
        false
    }
}

/// Stands in when no remote URL is configured. Every call reports the
/// network as unavailable, so remote listings stay empty and sync fails
/// with a clear message.
pub struct UnconfiguredRemote;

fn unconfigured() -> Error {
    Error::network_unavailable("TALLY_REMOTE_URL is not set")
}

#[async_trait]
impl RemoteStore for UnconfiguredRemote {
    async fn put(&self, _name: &str, _bytes: Vec<u8>) -> tally_core::Result<()> {
        Err(unconfigured())
    }

    async fn get(
        &self,
        _name: &str,
        _dest: &Path,
        _progress: Option<TransferProgress>,
    ) -> tally_core::Result<u64> {
        Err(unconfigured())
    }

    async fn list(&self) -> tally_core::Result<Vec<RemoteObject>> {
        Err(unconfigured())
    }

    async fn delete(&self, _name: &str) -> tally_core::Result<()> {
        Err(unconfigured())
    }

    async fn head(&self, _name: &str) -> tally_core::Result<Option<RemoteObject>> {
        Err(unconfigured())
    }
}
