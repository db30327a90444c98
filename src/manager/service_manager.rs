//! The per-node rebalance coordinator and its cluster-manager surface.

use crate::error::{Error, Result, StateError};
use crate::metakv::{MetakvClient, REBALANCE_TOKEN_PATH};
use crate::placement::VbucketMap;
use crate::retry::FixedBackoff;
use crate::state::StateStore;
use crate::supervisor::ProducerSupervisor;
use crate::topology::SnapshotStore;
use crate::types::{
    NodeId, NodeInfo, State, Task, TaskList, TaskStatus, TaskType, Topology, TopologyChange,
};
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::rebalancer::{DeployedFunctions, DoneFn, PlacementFn, ProgressFn, Rebalancer};

/// Per-change bookkeeping. At most one exists per node at any time.
struct RebalanceContext {
    change: TopologyChange,
    /// Local task revision, distinct from the state revision.
    rev: u64,
    /// Cancellation signal owned by this context, observed by the
    /// rebalancer.
    cancel: CancellationToken,
}

impl RebalanceContext {
    fn next_rev(&mut self) -> u64 {
        let current = self.rev;
        self.rev += 1;
        current
    }
}

/// Coordinates topology changes for this node.
///
/// The cluster manager calls `prepare_topology_change` on every node and
/// `start_topology_change` on the node it designates as leader for the
/// change; enforcing that designation is the manager's business, not ours.
pub struct ServiceManager {
    node_id: NodeId,
    num_vbuckets: u16,
    poll_interval: Duration,
    backoff: FixedBackoff,

    state: Arc<StateStore>,
    metakv: MetakvClient,
    snapshots: Arc<SnapshotStore>,
    supervisor: Arc<dyn ProducerSupervisor>,
    functions: Arc<dyn DeployedFunctions>,

    ctx: RwLock<Option<RebalanceContext>>,
    /// Last applied vbucket map, swapped in whole. Readers take a
    /// snapshot reference and never mutate.
    placement: RwLock<Option<Arc<VbucketMap>>>,
    /// Set when the cluster manager signalled a failover; cleared by the
    /// next start.
    failover_notif: AtomicBool,
    /// Root shutdown token; metakv housekeeping outlives any one change.
    shutdown: CancellationToken,
}

impl ServiceManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: NodeId,
        num_vbuckets: u16,
        poll_interval: Duration,
        backoff: FixedBackoff,
        metakv: MetakvClient,
        snapshots: Arc<SnapshotStore>,
        supervisor: Arc<dyn ProducerSupervisor>,
        functions: Arc<dyn DeployedFunctions>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        info!(%node_id, num_vbuckets, "starting service manager");
        Arc::new(Self {
            state: Arc::new(StateStore::new(State::new(node_id.clone()))),
            node_id,
            num_vbuckets,
            poll_interval,
            backoff,
            metakv,
            snapshots,
            supervisor,
            functions,
            ctx: RwLock::new(None),
            placement: RwLock::new(None),
            failover_notif: AtomicBool::new(false),
            shutdown,
        })
    }

    /// This node's identity as the cluster manager sees it.
    pub fn get_node_info(&self) -> NodeInfo {
        NodeInfo::new(self.node_id.clone())
    }

    /// Direct state snapshot, bypassing the long-poll protocol.
    pub fn current_state(&self) -> State {
        self.state.current()
    }

    /// Long-poll the task list. A `None` revision returns immediately; a
    /// matching revision blocks until the state advances or `cancel`
    /// fires.
    pub async fn get_task_list(
        &self,
        rev: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<TaskList> {
        let state = self.state.wait(rev, cancel).await?;
        Ok(TaskList::from(&state))
    }

    /// Long-poll the topology, same protocol as `get_task_list`.
    pub async fn get_current_topology(
        &self,
        rev: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Topology> {
        let state = self.state.wait(rev, cancel).await?;
        Ok(Topology::from(&state))
    }

    /// Record that the cluster manager performed a failover.
    pub fn note_failover(&self) {
        self.failover_notif.store(true, Ordering::SeqCst);
    }

    /// Validate a pending change against this node.
    ///
    /// A single-node change naming a different node means this node is not
    /// part of the cluster the manager is describing.
    pub fn prepare_topology_change(&self, change: &TopologyChange) -> Result<()> {
        if change.is_single_node() {
            if change.keep_nodes[0].node_id == self.node_id {
                info!(change_id = %change.id, "prepare: only node in the cluster");
            } else {
                return Err(Error::NotInCluster);
            }
        }

        self.state.update(|s| {
            s.rebalance_id = change.id.clone();
        });

        Ok(())
    }

    /// Begin executing a prepared change. Invoked only on the designated
    /// leader node.
    pub async fn start_topology_change(self: &Arc<Self>, change: TopologyChange) -> Result<()> {
        if self.state.current().rebalance_id != change.id {
            return Err(Error::Conflict(format!(
                "change {} was not prepared on this node",
                change.id
            )));
        }
        if self.ctx.read().is_some() {
            return Err(Error::Conflict("rebalance already in progress".into()));
        }

        // A stale failover notification must not outlive the change that
        // resolves it.
        self.failover_notif.store(false, Ordering::SeqCst);

        info!(change_id = %change.id, "garbage collecting old rebalance tokens");
        self.metakv
            .delete_subtree(REBALANCE_TOKEN_PATH, &self.shutdown)
            .await?;

        let token_path = format!("{}{}", REBALANCE_TOKEN_PATH, change.id);
        info!(change_id = %change.id, %token_path, "writing rebalance token");
        self.metakv
            .set(&token_path, Bytes::from(change.id.clone()), &self.shutdown)
            .await?;

        let keep_nodes = change.keep_node_ids();
        self.metakv
            .write_keep_nodes(&keep_nodes, &self.shutdown)
            .await?;

        let cancel = self.shutdown.child_token();
        let task_rev = {
            let mut guard = self.ctx.write();
            let ctx = guard.insert(RebalanceContext {
                change: change.clone(),
                rev: 0,
                cancel: cancel.clone(),
            });
            ctx.next_rev()
        };

        self.state.update(|s| {
            s.servers = keep_nodes.clone();
            s.rebalance_task = Some(running_task(task_rev, &change.id, 0.0));
        });

        self.spawn_rebalancer(change, keep_nodes, cancel);
        Ok(())
    }

    fn spawn_rebalancer(
        self: &Arc<Self>,
        change: TopologyChange,
        keep_nodes: Vec<NodeId>,
        cancel: CancellationToken,
    ) {
        let rebalancer = Rebalancer {
            node_id: self.node_id.clone(),
            num_vbuckets: self.num_vbuckets,
            keep_nodes,
            snapshots: Arc::clone(&self.snapshots),
            supervisor: Arc::clone(&self.supervisor),
            functions: Arc::clone(&self.functions),
            backoff: self.backoff,
            poll_interval: self.poll_interval,
            cancel: cancel.clone(),
        };

        // Both callbacks re-check the context's cancellation before
        // touching state, so a concurrent cancel always wins the race.
        let on_progress: ProgressFn = {
            let manager = Arc::clone(self);
            let cancel = cancel.clone();
            Arc::new(move |progress| {
                if !cancel.is_cancelled() {
                    manager.update_progress(progress);
                }
            })
        };

        let on_placement: PlacementFn = {
            let manager = Arc::clone(self);
            Box::new(move |vb_map| {
                *manager.placement.write() = Some(vb_map);
            })
        };

        let on_done: DoneFn = {
            let manager = Arc::clone(self);
            let cancel = cancel.clone();
            Box::new(move |err| {
                if !cancel.is_cancelled() {
                    manager.on_rebalance_done(err);
                }
            })
        };

        info!(change_id = %change.id, "spawning rebalancer");
        tokio::spawn(rebalancer.run(on_progress, on_placement, on_done));
    }

    /// Snapshot of the last applied vbucket map, if any rebalance has
    /// completed placement on this node.
    pub fn current_vbucket_map(&self) -> Option<Arc<VbucketMap>> {
        self.placement.read().clone()
    }

    /// Publish new progress for the running task, bumping the revision.
    pub fn update_progress(&self, progress: f64) {
        let published = {
            let mut guard = self.ctx.write();
            guard
                .as_mut()
                .map(|ctx| (ctx.next_rev(), ctx.change.id.clone()))
        };

        let Some((rev, change_id)) = published else {
            // Progress delivered after done/cancel; nothing to publish.
            return;
        };

        self.state.update(|s| {
            s.rebalance_task = Some(running_task(rev, &change_id, progress));
        });
    }

    /// Finish the current change. A `Some` error publishes a failed task
    /// that stays visible until the cluster manager cancels it; `None`
    /// clears the task.
    pub fn on_rebalance_done(&self, err: Option<String>) {
        let Some(mut ctx) = self.ctx.write().take() else {
            // cancel already converged the state; done loses the race.
            return;
        };

        // Stop the rebalancer if it is still pumping; cancelling an
        // already-cancelled token is a no-op.
        ctx.cancel.cancel();

        let new_task = err.map(|message| {
            error!(change_id = %ctx.change.id, %message, "rebalance failed");
            Task {
                rev: ctx.next_rev(),
                id: format!("rebalance/{}", ctx.change.id),
                task_type: TaskType::Rebalance,
                status: TaskStatus::Failed,
                is_cancelable: true,
                progress: 0.0,
                error_message: Some(message),
                rebalance_id: ctx.change.id.clone(),
            }
        });

        self.state.update(|s| {
            s.rebalance_task = new_task;
            s.rebalance_id = String::new();
        });
    }

    /// The producer supervisor reports a failure the coordinator cannot
    /// compensate for.
    pub fn on_unrecoverable(&self, reason: &str) {
        warn!(%reason, "supervisor reported unrecoverable failure");
        self.on_rebalance_done(Some(reason.to_string()));
    }

    /// Cancel a published task.
    ///
    /// Cancelling a running rebalance signals the context, converges the
    /// state, and deletes the rebalance token; cancelling a failed task
    /// just clears it.
    pub async fn cancel_task(&self, task_id: &str, rev: Option<u64>) -> Result<()> {
        let task = self
            .state
            .current()
            .rebalance_task
            .ok_or_else(|| StateError::TaskNotFound(task_id.to_string()))?;

        if task.id != task_id {
            return Err(StateError::TaskNotFound(task_id.to_string()).into());
        }
        if rev.is_some_and(|r| r != task.rev) {
            return Err(StateError::RevMismatch(task_id.to_string()).into());
        }

        match task.status {
            TaskStatus::Running => self.cancel_running_rebalance().await,
            TaskStatus::Failed => {
                self.state.update(|s| s.rebalance_task = None);
                Ok(())
            }
        }
    }

    async fn cancel_running_rebalance(&self) -> Result<()> {
        let cancelled = {
            let guard = self.ctx.read();
            guard
                .as_ref()
                .map(|ctx| (ctx.cancel.clone(), ctx.change.id.clone()))
        };

        let Some((cancel, change_id)) = cancelled else {
            // done beat us to it; double cancel is a no-op.
            return Ok(());
        };

        cancel.cancel();
        self.on_rebalance_done(None);

        self.metakv
            .delete_subtree(REBALANCE_TOKEN_PATH, &self.shutdown)
            .await?;
        info!(%change_id, "deleted rebalance token after cancelling rebalance");

        Ok(())
    }

    /// Adopt the persisted keep-set after a crash respawn.
    ///
    /// A freshly respawned node publishes only itself as membership. If a
    /// keep-set survives in the metadata register from the last topology
    /// change, it is the authoritative membership; adopting it closes the
    /// window in which this node would place all vbuckets on itself.
    pub async fn bootstrap_recover(&self, cancel: &CancellationToken) -> Result<()> {
        let servers = self.state.current().servers;
        if servers.len() != 1 || servers[0] != self.node_id {
            return Ok(());
        }

        match self.metakv.read_keep_nodes(cancel).await {
            Ok(keep) if !keep.is_empty() => {
                info!(previous = ?servers, current = ?keep, "adopting keep nodes from register");
                self.state.update(|s| s.servers = keep);
            }
            Ok(_) => {
                error!("keep nodes blob is empty, keeping single-node membership");
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                error!(%err, "failed to read keep nodes");
            }
        }
        Ok(())
    }
}

fn running_task(rev: u64, change_id: &str, progress: f64) -> Task {
    Task {
        rev,
        id: change_id.to_string(),
        task_type: TaskType::Rebalance,
        status: TaskStatus::Running,
        is_cancelable: true,
        progress,
        error_message: None,
        rebalance_id: change_id.to_string(),
    }
}
