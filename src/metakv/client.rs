//! Retrying client over the external metadata register.

use crate::error::{Error, Result};
use crate::retry::{retry, FixedBackoff};
use crate::types::NodeId;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Minimal contract over the external linearisable small-blob store.
///
/// All operations are idempotent. Implementations surface transient I/O as
/// `Error::Transient`; the [`MetakvClient`] absorbs those with retry.
#[async_trait]
pub trait MetadataRegister: Send + Sync {
    /// Read a blob. `Ok(None)` when the path doesn't exist.
    async fn get(&self, path: &str) -> Result<Option<Bytes>>;

    /// Write a blob, overwriting any previous value.
    async fn set(&self, path: &str, value: Bytes) -> Result<()>;

    /// Delete every path under `prefix`. Deleting a missing subtree is a
    /// no-op.
    async fn delete_subtree(&self, prefix: &str) -> Result<()>;

    /// List `(path, value)` pairs under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Bytes)>>;
}

/// Register client that retries every call with fixed backoff until it
/// succeeds or the supplied cancellation token fires.
#[derive(Clone)]
pub struct MetakvClient {
    register: Arc<dyn MetadataRegister>,
    backoff: FixedBackoff,
}

impl MetakvClient {
    pub fn new(register: Arc<dyn MetadataRegister>, backoff: FixedBackoff) -> Self {
        Self { register, backoff }
    }

    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Option<Bytes>> {
        retry(self.backoff, cancel, || self.register.get(path)).await
    }

    pub async fn set(&self, path: &str, value: Bytes, cancel: &CancellationToken) -> Result<()> {
        retry(self.backoff, cancel, || {
            self.register.set(path, value.clone())
        })
        .await
    }

    pub async fn delete_subtree(&self, prefix: &str, cancel: &CancellationToken) -> Result<()> {
        retry(self.backoff, cancel, || self.register.delete_subtree(prefix)).await
    }

    pub async fn list(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, Bytes)>> {
        retry(self.backoff, cancel, || self.register.list(prefix)).await
    }

    /// Read the last-known keep-set. Missing or empty blobs decode to an
    /// empty list; a corrupt blob is reported, not retried.
    pub async fn read_keep_nodes(&self, cancel: &CancellationToken) -> Result<Vec<NodeId>> {
        let path = super::KEEP_NODES_PATH;
        match self.get(path, cancel).await? {
            Some(raw) if !raw.is_empty() => {
                let nodes: Vec<NodeId> = serde_json::from_slice(&raw)
                    .map_err(|e| Error::Transient(format!("corrupt keep-set blob: {e}")))?;
                Ok(nodes)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Persist the keep-set as a JSON array of node id strings.
    pub async fn write_keep_nodes(
        &self,
        nodes: &[NodeId],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let raw = serde_json::to_vec(nodes)?;
        debug!(count = nodes.len(), "writing keep nodes");
        self.set(super::KEEP_NODES_PATH, Bytes::from(raw), cancel)
            .await
    }
}

/// In-memory register. Backs unit tests and single-process embeddings.
#[derive(Default)]
pub struct MemoryRegister {
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored paths.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl MetadataRegister for MemoryRegister {
    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        Ok(self.blobs.read().get(path).cloned())
    }

    async fn set(&self, path: &str, value: Bytes) -> Result<()> {
        self.blobs.write().insert(path.to_string(), value);
        Ok(())
    }

    async fn delete_subtree(&self, prefix: &str) -> Result<()> {
        self.blobs.write().retain(|path, _| !path.starts_with(prefix));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Bytes)>> {
        Ok(self
            .blobs
            .read()
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect())
    }
}
