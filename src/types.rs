//! Core types used throughout the control plane.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical shard identifier in `[0, num_vbuckets)`.
pub type Vbucket = u16;

/// Opaque node identifier, stable for the life of a node.
pub type NodeId = String;

/// `host:port` address for a node, derived from the topology snapshot.
/// May change across restarts; never used as a stable identity.
pub type NodeAddr = String;

/// Service names understood by the cluster-info source.
pub const DATA_SERVICE: &str = "kv";

/// Service name this control plane registers under.
pub const EVENTING_SERVICE: &str = "eventing";

/// Kind of topology change requested by the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyChangeType {
    /// Planned rebalance: nodes joining and/or leaving.
    Rebalance,
    /// Failover: unhealthy nodes forcibly removed.
    Failover,
}

/// Identity of one node as named in a topology change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub node_id: NodeId,
}

impl NodeInfo {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

/// A topology change descriptor delivered by the cluster manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyChange {
    /// Short opaque identifier for this change, also used as the
    /// rebalance token.
    pub id: String,

    /// Kind of change.
    pub change_type: TopologyChangeType,

    /// Nodes that shall remain in the cluster after the change, in the
    /// order the cluster manager listed them.
    pub keep_nodes: Vec<NodeInfo>,

    /// Nodes scheduled for removal.
    pub eject_nodes: Vec<NodeInfo>,
}

impl TopologyChange {
    /// A change is single-node when it keeps exactly one node and ejects
    /// none.
    pub fn is_single_node(&self) -> bool {
        self.keep_nodes.len() == 1 && self.eject_nodes.is_empty()
    }

    /// Keep-set node ids in listed order.
    pub fn keep_node_ids(&self) -> Vec<NodeId> {
        self.keep_nodes.iter().map(|n| n.node_id.clone()).collect()
    }
}

/// Task type published to the cluster manager. Rebalance is the only task
/// the control plane runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Rebalance,
}

/// Status of a published task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Failed,
}

/// A task visible to long-pollers of the task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Revision of the rebalance context that produced this task.
    pub rev: u64,
    /// Task identifier. Running tasks carry the change id; failed tasks
    /// carry `rebalance/<change-id>`.
    pub id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Whether `cancel_task` may target this task.
    pub is_cancelable: bool,
    /// Progress in `[0.0, 1.0]`.
    pub progress: f64,
    /// Populated for failed tasks.
    pub error_message: Option<String>,
    /// The change id that spawned this task.
    pub rebalance_id: String,
}

/// Published view of this node, observed through the revisioned-state
/// long-poll surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Strictly increasing revision; the coordination primitive for
    /// waiters.
    pub rev: u64,
    /// Id of the in-flight change, empty when idle.
    pub rebalance_id: String,
    /// The current rebalance task, if any.
    pub rebalance_task: Option<Task>,
    /// Membership as this node publishes it.
    pub servers: Vec<NodeId>,
}

impl State {
    pub fn new(self_id: NodeId) -> Self {
        Self {
            rev: 0,
            rebalance_id: String::new(),
            rebalance_task: None,
            servers: vec![self_id],
        }
    }
}

/// Task list handed to `get_task_list` pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    pub rev: u64,
    pub tasks: Vec<Task>,
}

impl From<&State> for TaskList {
    fn from(s: &State) -> Self {
        Self {
            rev: s.rev,
            tasks: s.rebalance_task.iter().cloned().collect(),
        }
    }
}

/// Topology handed to `get_current_topology` pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub rev: u64,
    pub nodes: Vec<NodeId>,
    pub is_balanced: bool,
    pub messages: Vec<String>,
}

impl From<&State> for Topology {
    fn from(s: &State) -> Self {
        Self {
            rev: s.rev,
            nodes: s.servers.clone(),
            is_balanced: true,
            messages: Vec::new(),
        }
    }
}

/// A node's reported release version, used to gate features on cluster-wide
/// minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub enterprise: bool,
}

impl NodeVersion {
    pub const fn new(major: u32, minor: u32, patch: u32, enterprise: bool) -> Self {
        Self {
            major,
            minor,
            patch,
            enterprise,
        }
    }

    /// True when `self` is at least `min`, with enterprise as a hard
    /// requirement when `min` demands it.
    pub fn at_least(&self, min: &NodeVersion) -> bool {
        if min.enterprise && !self.enterprise {
            return false;
        }
        (self.major, self.minor, self.patch) >= (min.major, min.minor, min.patch)
    }

    /// Parse versions of the form `6.0.3-enterprise` or `6.5.0`.
    pub fn parse(s: &str) -> Option<Self> {
        let (nums, edition) = match s.split_once('-') {
            Some((n, e)) => (n, e),
            None => (s, ""),
        };
        let mut parts = nums.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next().unwrap_or("0").parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
            enterprise: edition.eq_ignore_ascii_case("enterprise"),
        })
    }
}

impl fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.enterprise {
            write!(f, "-enterprise")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(keep: &[&str], eject: &[&str]) -> TopologyChange {
        TopologyChange {
            id: "chg-1".into(),
            change_type: TopologyChangeType::Rebalance,
            keep_nodes: keep.iter().map(|n| NodeInfo::new(*n)).collect(),
            eject_nodes: eject.iter().map(|n| NodeInfo::new(*n)).collect(),
        }
    }

    #[test]
    fn test_single_node_change() {
        assert!(change(&["a"], &[]).is_single_node());
        assert!(!change(&["a", "b"], &[]).is_single_node());
        assert!(!change(&["a"], &["b"]).is_single_node());
    }

    #[test]
    fn test_task_list_from_state() {
        let mut state = State::new("n1".into());
        assert!(TaskList::from(&state).tasks.is_empty());

        state.rebalance_task = Some(Task {
            rev: 0,
            id: "chg-1".into(),
            task_type: TaskType::Rebalance,
            status: TaskStatus::Running,
            is_cancelable: true,
            progress: 0.0,
            error_message: None,
            rebalance_id: "chg-1".into(),
        });
        state.rev = 3;

        let tasks = TaskList::from(&state);
        assert_eq!(tasks.rev, 3);
        assert_eq!(tasks.tasks.len(), 1);
    }

    #[test]
    fn test_version_parse() {
        let v = NodeVersion::parse("6.0.3-enterprise").unwrap();
        assert_eq!(v, NodeVersion::new(6, 0, 3, true));

        let v = NodeVersion::parse("6.5.0").unwrap();
        assert!(!v.enterprise);

        assert!(NodeVersion::parse("garbage").is_none());
        assert!(NodeVersion::parse("1.2.3.4").is_none());
    }

    #[test]
    fn test_version_comparison() {
        let min = NodeVersion::new(6, 0, 3, true);

        assert!(NodeVersion::new(6, 0, 3, true).at_least(&min));
        assert!(NodeVersion::new(6, 5, 0, true).at_least(&min));
        assert!(!NodeVersion::new(6, 0, 2, true).at_least(&min));
        // Community build never satisfies an enterprise minimum.
        assert!(!NodeVersion::new(7, 0, 0, false).at_least(&min));
    }
}
