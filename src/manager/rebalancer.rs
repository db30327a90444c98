//! Background rebalancer: placement + supervisor handoff + progress pump.

use crate::error::{Error, PlacementError, Result};
use crate::placement::{assign_vbuckets, assign_workers, VbucketMap};
use crate::retry::{retry, FixedBackoff};
use crate::supervisor::ProducerSupervisor;
use crate::topology::SnapshotStore;
use crate::types::{NodeAddr, NodeId, Vbucket, EVENTING_SERVICE};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One deployed function whose workers must be re-seated during a
/// rebalance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionShard {
    pub name: String,
    pub worker_count: usize,
}

/// Source of the currently deployed functions.
#[async_trait]
pub trait DeployedFunctions: Send + Sync {
    async fn deployed(&self) -> Result<Vec<FunctionShard>>;
}

/// Fixed function list. Convenient for embedders that manage deployment
/// elsewhere, and for tests.
#[derive(Debug, Default)]
pub struct StaticFunctions(pub Vec<FunctionShard>);

#[async_trait]
impl DeployedFunctions for StaticFunctions {
    async fn deployed(&self) -> Result<Vec<FunctionShard>> {
        Ok(self.0.clone())
    }
}

pub(crate) type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;
pub(crate) type DoneFn = Box<dyn FnOnce(Option<String>) + Send>;
pub(crate) type PlacementFn = Box<dyn FnOnce(Arc<VbucketMap>) + Send>;

/// Drives one topology change to completion: refresh the topology, compute
/// the new placement, hand it to the supervisor, then pump progress until
/// the supervisor reports 1.0 or the context is cancelled.
pub(crate) struct Rebalancer {
    pub node_id: NodeId,
    pub num_vbuckets: u16,
    pub keep_nodes: Vec<NodeId>,
    pub snapshots: Arc<SnapshotStore>,
    pub supervisor: Arc<dyn ProducerSupervisor>,
    pub functions: Arc<dyn DeployedFunctions>,
    pub backoff: FixedBackoff,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

impl Rebalancer {
    /// Run to completion, reporting through the callbacks.
    ///
    /// On cancellation no completion callback fires; the cancel path has
    /// already converged the published state.
    pub(crate) async fn run(self, on_progress: ProgressFn, on_placement: PlacementFn, on_done: DoneFn) {
        match self.drive(&on_progress, on_placement).await {
            Ok(()) => on_done(None),
            Err(Error::Cancelled) => {
                debug!(node_id = %self.node_id, "rebalancer cancelled");
            }
            Err(err) => on_done(Some(err.to_string())),
        }
    }

    async fn drive(&self, on_progress: &ProgressFn, on_placement: PlacementFn) -> Result<()> {
        let snapshot = retry(self.backoff, &self.cancel, || self.snapshots.refresh()).await?;

        // Only nodes that remain after the change take ownership. Keep
        // nodes not yet visible in the snapshot are skipped; placement on
        // the visible survivors is still total.
        let candidates: Vec<NodeAddr> = self
            .keep_nodes
            .iter()
            .filter_map(|id| snapshot.service_address(id, EVENTING_SERVICE).cloned())
            .collect();
        if candidates.is_empty() {
            return Err(PlacementError::EmptyCluster.into());
        }

        let self_addr = snapshot
            .service_address(&self.node_id, EVENTING_SERVICE)
            .cloned();

        let vb_map = assign_vbuckets(self.num_vbuckets, &candidates)?;

        let functions = retry(self.backoff, &self.cancel, || self.functions.deployed()).await?;
        let workers = match &self_addr {
            Some(addr) if candidates.contains(addr) => {
                let owned = vb_map.owned_by(addr);
                let mut merged: BTreeMap<String, Vec<Vbucket>> = BTreeMap::new();
                for function in &functions {
                    merged.extend(assign_workers(
                        &owned,
                        &function.name,
                        function.worker_count,
                    )?);
                }
                merged
            }
            // This node is being ejected; it sheds everything.
            _ => BTreeMap::new(),
        };

        info!(
            node_id = %self.node_id,
            candidates = candidates.len(),
            functions = functions.len(),
            local_workers = workers.len(),
            "applying placement"
        );

        self.supervisor.pause().await?;
        self.supervisor
            .apply_placement(vb_map.owners(), &workers)
            .await?;
        self.supervisor.resume().await?;

        // Publish the applied map for readers; they hold a snapshot
        // reference and never mutate.
        on_placement(Arc::new(vb_map));

        // Progress 0.0 was published when the task was created; only
        // movement is worth a revision bump.
        let mut published = 0.0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let progress = retry(self.backoff, &self.cancel, || {
                self.supervisor.local_progress()
            })
            .await?
            .clamp(0.0, 1.0);

            if progress > published {
                on_progress(progress);
                published = progress;
            }

            if progress >= 1.0 {
                return Ok(());
            }
        }
    }
}
