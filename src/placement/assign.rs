//! Deterministic vbucket→node assignment and worker sharding.

use crate::error::PlacementError;
use crate::types::{NodeAddr, Vbucket};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Contiguous range of vbuckets owned by one node, for planner
/// introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVbRange {
    pub addr: NodeAddr,
    pub start_vb: Vbucket,
    pub count: u16,
}

/// The vbucket→owner map for the whole cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VbucketMap {
    owners: HashMap<Vbucket, NodeAddr>,
    ranges: Vec<NodeVbRange>,
}

impl VbucketMap {
    /// Owner address for a vbucket.
    pub fn owner(&self, vb: Vbucket) -> Option<&NodeAddr> {
        self.owners.get(&vb)
    }

    /// The full owner map.
    pub fn owners(&self) -> &HashMap<Vbucket, NodeAddr> {
        &self.owners
    }

    /// Per-node contiguous range summaries, in assignment order.
    pub fn ranges(&self) -> &[NodeVbRange] {
        &self.ranges
    }

    /// Vbuckets owned by `addr`, ascending.
    pub fn owned_by(&self, addr: &str) -> Vec<Vbucket> {
        let mut owned: Vec<Vbucket> = self
            .owners
            .iter()
            .filter(|(_, a)| a.as_str() == addr)
            .map(|(vb, _)| *vb)
            .collect();
        owned.sort_unstable();
        owned
    }
}

/// Split `total` items across `parts` slots: the first `total % parts`
/// slots take one extra item.
fn split_counts(total: usize, parts: usize) -> Vec<usize> {
    let base = total / parts;
    let extra = total % parts;
    (0..parts).map(|i| base + usize::from(i < extra)).collect()
}

/// Assign `[0, num_vbuckets)` to the candidate addresses in contiguous
/// ascending ranges.
///
/// Candidates are sorted lexicographically first so every node computes the
/// same map regardless of the order its topology source listed them.
pub fn assign_vbuckets(
    num_vbuckets: u16,
    candidates: &[NodeAddr],
) -> Result<VbucketMap, PlacementError> {
    if candidates.is_empty() {
        return Err(PlacementError::EmptyCluster);
    }

    let mut addrs: Vec<NodeAddr> = candidates.to_vec();
    addrs.sort_unstable();
    addrs.dedup();

    let counts = split_counts(usize::from(num_vbuckets), addrs.len());

    let mut owners = HashMap::with_capacity(usize::from(num_vbuckets));
    let mut ranges = Vec::with_capacity(addrs.len());
    let mut next_vb: u16 = 0;

    for (addr, count) in addrs.into_iter().zip(counts) {
        debug!(%addr, start_vb = next_vb, count, "assigning vbucket range");
        ranges.push(NodeVbRange {
            addr: addr.clone(),
            start_vb: next_vb,
            count: count as u16,
        });
        for _ in 0..count {
            owners.insert(next_vb, addr.clone());
            next_vb += 1;
        }
    }

    Ok(VbucketMap { owners, ranges })
}

/// Name of worker `index` for `function_name`.
pub fn worker_name(function_name: &str, index: usize) -> String {
    format!("worker_{function_name}_{index}")
}

/// Partition the locally owned vbuckets across `worker_count` workers.
///
/// `owned` must be ascending. Trailing workers may receive zero vbuckets
/// when there are more workers than vbuckets; they still appear in the map.
pub fn assign_workers(
    owned: &[Vbucket],
    function_name: &str,
    worker_count: usize,
) -> Result<BTreeMap<String, Vec<Vbucket>>, PlacementError> {
    if worker_count == 0 {
        return Err(PlacementError::ZeroWorkers);
    }

    let counts = split_counts(owned.len(), worker_count);

    let mut workers = BTreeMap::new();
    let mut next = 0;
    for (i, count) in counts.into_iter().enumerate() {
        let shard = owned[next..next + count].to_vec();
        next += count;
        workers.insert(worker_name(function_name, i), shard);
    }

    Ok(workers)
}

/// A complete placement: the cluster-wide owner map plus the local worker
/// assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    vb_map: VbucketMap,
    workers: BTreeMap<String, Vec<Vbucket>>,
}

impl PlacementPlan {
    /// Run the full placement for one function on this node.
    ///
    /// When `self_addr` is not among the candidates the node is being
    /// ejected; the owner map is still total but the worker assignment is
    /// empty.
    pub fn compute(
        num_vbuckets: u16,
        candidates: &[NodeAddr],
        self_addr: &str,
        function_name: &str,
        worker_count: usize,
    ) -> Result<Self, PlacementError> {
        let vb_map = assign_vbuckets(num_vbuckets, candidates)?;

        let workers = if candidates.iter().any(|a| a == self_addr) {
            assign_workers(&vb_map.owned_by(self_addr), function_name, worker_count)?
        } else {
            // Ejected node: nothing to shard locally.
            BTreeMap::new()
        };

        Ok(Self { vb_map, workers })
    }

    pub fn owners(&self) -> &HashMap<Vbucket, NodeAddr> {
        self.vb_map.owners()
    }

    pub fn vb_map(&self) -> &VbucketMap {
        &self.vb_map
    }

    pub fn workers(&self) -> &BTreeMap<String, Vec<Vbucket>> {
        &self.workers
    }
}
