//! Producer supervisor contract.
//!
//! The supervisor owns and lifecycles the local worker processes that
//! actually consume data-change events. It lives outside this crate; the
//! coordinator drives it through this narrow interface and composes its
//! `local_progress` into the cluster-wide progress it publishes.

use crate::error::Result;
use crate::types::{NodeAddr, Vbucket};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// The interface the rebalance coordinator drives.
///
/// `apply_placement` must be idempotent: the supervisor reconciles running
/// workers toward the target shape, and applying the same placement twice
/// has the same effect as applying it once.
#[async_trait]
pub trait ProducerSupervisor: Send + Sync {
    /// Reconcile local workers to the target placement.
    async fn apply_placement(
        &self,
        owners: &HashMap<Vbucket, NodeAddr>,
        workers: &BTreeMap<String, Vec<Vbucket>>,
    ) -> Result<()>;

    /// Quiesce event processing.
    async fn pause(&self) -> Result<()>;

    /// Resume event processing.
    async fn resume(&self) -> Result<()>;

    /// Start workers for a deployed function.
    async fn deploy(&self, function: &str) -> Result<()>;

    /// Tear down a function's workers.
    async fn undeploy(&self, function: &str) -> Result<()>;

    /// Local share of rebalance progress, in `[0.0, 1.0]`.
    async fn local_progress(&self) -> Result<f64>;
}
