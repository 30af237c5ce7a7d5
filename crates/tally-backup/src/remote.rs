//! Remote object store.
//!
//! Snapshots replicate to a plain HTTP object API: `PUT/GET/DELETE
//! /objects/{name}` plus `GET /objects` returning a JSON listing, bearer
//! authenticated. Uploads are single-shot bodies sized for low tens of
//! megabytes; downloads stream to a staging file with progress callbacks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{Error, Result};
use tracing::debug;

/// Per-attempt request timeout; overall give-up behavior belongs to the
/// caller's retry policy.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

/// Truncation limit for error-message bodies.
const ERROR_BODY_LIMIT: usize = 200;

/// One entry in the remote listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteObject {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Transfer progress callback: `(transferred_bytes, total_bytes)`, with a
/// total of 0 when the size is unknown.
pub type TransferProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Uploads `bytes` under `name`, overwriting any existing object.
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Streams the object into `dest`, returning the byte count.
    async fn get(
        &self,
        name: &str,
        dest: &Path,
        progress: Option<TransferProgress>,
    ) -> Result<u64>;

    async fn list(&self) -> Result<Vec<RemoteObject>>;

    /// Removes the object. Deleting something already gone succeeds, so a
    /// cancelled upload can always clean up after itself.
    async fn delete(&self, name: &str) -> Result<()>;

    async fn head(&self, name: &str) -> Result<Option<RemoteObject>>;
}

pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::remote(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/objects/{}", self.base_url, name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.authorize(request).send().await.map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::network_unavailable(err.to_string())
    } else {
        Error::remote(err.to_string())
    }
}

/// Turns a non-success response into the matching error, folding in as much
/// of the body as is worth keeping.
async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    body.truncate(ERROR_BODY_LIMIT);
    let message = if body.is_empty() {
        format!("remote returned status {status}")
    } else {
        body
    };
    match status {
        401 | 403 => Error::auth_failed(message),
        _ => Error::remote_status(status, message),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len();
        let response = self
            .send(self.client.put(self.object_url(name)).body(bytes))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        debug!(name, size, "uploaded remote object");
        Ok(())
    }

    async fn get(
        &self,
        name: &str,
        dest: &Path,
        progress: Option<TransferProgress>,
    ) -> Result<u64> {
        let response = self.send(self.client.get(self.object_url(name))).await?;
        if response.status().as_u16() == 404 {
            return Err(Error::snapshot_not_found(name));
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let total = response.content_length().unwrap_or(0);
        let staged = dest.with_extension("partial");
        let mut file = fs::File::create(&staged)?;
        let mut transferred: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport_error)?;
            file.write_all(&chunk)?;
            transferred += chunk.len() as u64;
            if let Some(report) = &progress {
                report(transferred, total);
            }
        }
        file.sync_all()?;
        drop(file);
        fs::rename(&staged, dest)?;

        debug!(name, bytes = transferred, "downloaded remote object");
        Ok(transferred)
    }

    async fn list(&self) -> Result<Vec<RemoteObject>> {
        let response = self.send(self.client.get(format!("{}/objects", self.base_url))).await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        response
            .json::<Vec<RemoteObject>>()
            .await
            .map_err(|e| Error::remote(format!("malformed remote listing: {e}")))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let response = self.send(self.client.delete(self.object_url(name))).await?;
        if response.status().as_u16() == 404 || response.status().is_success() {
            return Ok(());
        }
        Err(status_error(response).await)
    }

    async fn head(&self, name: &str) -> Result<Option<RemoteObject>> {
        let response = self.send(self.client.head(self.object_url(name))).await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(Some(RemoteObject {
            name: name.to_string(),
            size_bytes: response.content_length().unwrap_or(0),
            modified_at: None,
        }))
    }
}
