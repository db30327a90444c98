//! Immutable cluster topology snapshots.

use crate::error::{Error, Result};
use crate::retry::{retry_n, FixedBackoff};
use crate::types::{NodeAddr, NodeId, NodeVersion, Vbucket, DATA_SERVICE};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Fetch attempts before a snapshot refresh gives up.
pub const SNAPSHOT_FETCH_ATTEMPTS: usize = 3;

/// Static facts about one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub uuid: String,
    pub is_memcached: bool,
}

#[derive(Debug, Clone, Default)]
struct NodeEntry {
    /// Per-service `host:port` addresses.
    addresses: HashMap<String, NodeAddr>,
    version: Option<NodeVersion>,
}

/// One immutable view of the cluster. Created on demand, discarded after
/// use.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    nodes: HashMap<NodeId, NodeEntry>,
    services: HashMap<String, Vec<NodeId>>,
    /// `(node, bucket)` → vbuckets hosted there.
    vbuckets: HashMap<(NodeId, String), Vec<Vbucket>>,
    buckets: HashMap<String, BucketInfo>,
}

impl TopologySnapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Node ids registered under `service`, in registration order.
    pub fn nodes_by_service(&self, service: &str) -> &[NodeId] {
        self.services.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `host:port` for a node's instance of `service`.
    pub fn service_address(&self, node: &str, service: &str) -> Option<&NodeAddr> {
        self.nodes.get(node)?.addresses.get(service)
    }

    /// Addresses of every node running `service`, in registration order.
    pub fn service_addresses(&self, service: &str) -> Vec<NodeAddr> {
        self.nodes_by_service(service)
            .iter()
            .filter_map(|n| self.service_address(n, service).cloned())
            .collect()
    }

    /// Vbuckets of `bucket` hosted on `node`.
    pub fn vbuckets_for(&self, node: &str, bucket: &str) -> &[Vbucket] {
        self.vbuckets
            .get(&(node.to_string(), bucket.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// UUID of `bucket`, `None` when the bucket doesn't exist.
    pub fn bucket_uuid(&self, bucket: &str) -> Option<&str> {
        self.buckets.get(bucket).map(|b| b.uuid.as_str())
    }

    /// Whether `bucket` is a memcached bucket. `None` when it doesn't
    /// exist.
    pub fn is_memcached_bucket(&self, bucket: &str) -> Option<bool> {
        self.buckets.get(bucket).map(|b| b.is_memcached)
    }

    /// Reported versions of every node that published one.
    pub fn node_versions(&self) -> Vec<NodeVersion> {
        self.nodes.values().filter_map(|n| n.version).collect()
    }

    /// Vbucket → data-service address map for `bucket`, over every node
    /// hosting part of it.
    pub fn kv_vb_map(&self, bucket: &str) -> HashMap<Vbucket, NodeAddr> {
        let mut map = HashMap::new();
        for node in self.nodes_by_service(DATA_SERVICE) {
            let Some(addr) = self.service_address(node, DATA_SERVICE) else {
                continue;
            };
            for vb in self.vbuckets_for(node, bucket) {
                map.insert(*vb, addr.clone());
            }
        }
        map
    }
}

/// Assembles a [`TopologySnapshot`]. Used by cluster-info sources and by
/// test fixtures.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: TopologySnapshot,
}

impl SnapshotBuilder {
    /// Register `node` under `service` at `addr`.
    pub fn node(mut self, node: &str, service: &str, addr: &str) -> Self {
        self.snapshot
            .nodes
            .entry(node.to_string())
            .or_default()
            .addresses
            .insert(service.to_string(), addr.to_string());
        let members = self.snapshot.services.entry(service.to_string()).or_default();
        if !members.iter().any(|m| m == node) {
            members.push(node.to_string());
        }
        self
    }

    /// Record `node`'s reported version.
    pub fn version(mut self, node: &str, version: NodeVersion) -> Self {
        self.snapshot
            .nodes
            .entry(node.to_string())
            .or_default()
            .version = Some(version);
        self
    }

    /// Register a bucket.
    pub fn bucket(mut self, name: &str, uuid: &str, is_memcached: bool) -> Self {
        self.snapshot.buckets.insert(
            name.to_string(),
            BucketInfo {
                uuid: uuid.to_string(),
                is_memcached,
            },
        );
        self
    }

    /// Record the vbuckets of `bucket` hosted on `node`.
    pub fn vbuckets(mut self, node: &str, bucket: &str, vbs: Vec<Vbucket>) -> Self {
        self.snapshot
            .vbuckets
            .insert((node.to_string(), bucket.to_string()), vbs);
        self
    }

    pub fn build(self) -> TopologySnapshot {
        self.snapshot
    }
}

/// External source of cluster topology, typically the cluster manager's
/// info endpoint.
#[async_trait]
pub trait ClusterInfoSource: Send + Sync {
    /// Fetch a fresh snapshot. Transient failures are retried by the
    /// [`SnapshotStore`].
    async fn fetch(&self) -> Result<TopologySnapshot>;
}

/// Produces fresh snapshots on demand, absorbing transient fetch failures.
///
/// Stateless between calls: every `refresh` hits the source again.
pub struct SnapshotStore {
    source: Arc<dyn ClusterInfoSource>,
    backoff: FixedBackoff,
}

impl SnapshotStore {
    pub fn new(source: Arc<dyn ClusterInfoSource>, backoff: FixedBackoff) -> Self {
        Self { source, backoff }
    }

    /// Fetch a fresh snapshot, retrying transient failures up to
    /// [`SNAPSHOT_FETCH_ATTEMPTS`] times.
    pub async fn refresh(&self) -> Result<TopologySnapshot> {
        let snapshot = retry_n(self.backoff, SNAPSHOT_FETCH_ATTEMPTS, || {
            self.source.fetch()
        })
        .await?;
        debug!(
            eventing_nodes = snapshot.nodes_by_service(crate::types::EVENTING_SERVICE).len(),
            buckets = snapshot.buckets.len(),
            "refreshed topology snapshot"
        );
        Ok(snapshot)
    }

    /// Addresses of the nodes currently running the eventing service.
    ///
    /// May include nodes about to be ejected; the placement engine filters
    /// through the keep-set.
    pub async fn eventing_addresses(&self) -> Result<Vec<NodeAddr>> {
        let snapshot = self.refresh().await?;
        let addrs = snapshot.service_addresses(crate::types::EVENTING_SERVICE);
        if addrs.is_empty() {
            return Err(Error::Transient(
                "0 nodes reported for eventing service, unexpected".into(),
            ));
        }
        Ok(addrs)
    }
}
