//! Topology snapshots from the external cluster-info source.
//!
//! A snapshot is an immutable view of cluster membership at one instant:
//! which nodes run which service, their per-service addresses, how each
//! bucket's vbuckets are spread over the data service, and each node's
//! reported version. Snapshots are produced on demand and must not be
//! cached across a topology change.
//!
//! The actual cluster-info endpoint lives outside this crate; it is
//! abstracted as [`ClusterInfoSource`] and wrapped by [`SnapshotStore`],
//! which absorbs transient fetch failures with a bounded fixed-interval
//! retry.

mod snapshot;

pub use snapshot::{
    BucketInfo, ClusterInfoSource, SnapshotBuilder, SnapshotStore, TopologySnapshot,
    SNAPSHOT_FETCH_ATTEMPTS,
};
