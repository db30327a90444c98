//! Vbucket placement and worker sharding.
//!
//! Placement is a pure function: given the vbucket count, the candidate node
//! addresses, and the local address, it produces the vbucket→node owner map
//! and the per-worker shard assignment for the local node. Every node in the
//! cluster runs the same computation over the same inputs and arrives at a
//! byte-identical result, so no central planner is needed.
//!
//! ```text
//! N = 1024, candidates = [a:1, b:1, c:1]
//!
//!   a:1 ──▶ [   0, 342)   (342 vbuckets)
//!   b:1 ──▶ [ 342, 683)   (341 vbuckets)
//!   c:1 ──▶ [ 683, 1024)  (341 vbuckets)
//!
//! self = b:1, worker_count = 4, function = "enrich"
//!
//!   worker_enrich_0 ──▶ 86 vbuckets
//!   worker_enrich_1 ──▶ 85 vbuckets
//!   worker_enrich_2 ──▶ 85 vbuckets
//!   worker_enrich_3 ──▶ 85 vbuckets
//! ```
//!
//! # Example
//!
//! ```rust
//! use shardplane::placement::PlacementPlan;
//!
//! let candidates = vec!["b:1".to_string(), "a:1".to_string()];
//! let plan = PlacementPlan::compute(16, &candidates, "a:1", "enrich", 2).unwrap();
//!
//! assert_eq!(plan.owners().len(), 16);
//! assert_eq!(plan.workers().len(), 2);
//! ```

mod assign;

pub use assign::{
    assign_vbuckets, assign_workers, worker_name, NodeVbRange, PlacementPlan, VbucketMap,
};
