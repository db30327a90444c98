//! Control plane for a cluster-aware, vbucket-sharded event-processing
//! service.
//!
//! This crate decides which node of the service cluster owns which logical
//! shards ("vbuckets"), participates in the external cluster manager's
//! prepare / start / cancel topology-change protocol, publishes rebalance
//! progress through a revisioned long-poll surface, and gates every
//! function-definition or config mutation behind a validator.
//!
//! # Features
//!
//! - Deterministic vbucket placement: every node computes the same
//!   vbucket→node map from the same inputs, no central planner
//! - Per-node rebalance coordination with safe cancel/done convergence
//! - Revisioned state with one-shot long-poll waiters
//! - Full structural validation of function definitions and settings
//!
//! # Example
//!
//! ```rust,ignore
//! use shardplane::{Service, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> shardplane::Result<()> {
//!     let config = ServiceConfig::from_map(&process_config)?;
//!
//!     // register / cluster_info / supervisor are the embedder's
//!     // implementations of the three collaborator traits.
//!     let service = Service::start(config, register, cluster_info, supervisor).await?;
//!
//!     // Wire the cluster manager's RPC surface to the coordinator.
//!     let manager = service.manager().clone();
//!     let tasks = manager.get_task_list(None, &service.shutdown_token()).await?;
//!     println!("tasks at rev {}", tasks.rev);
//!
//!     service.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    Service                      │
//! │                                                 │
//! │  ┌───────────────┐      ┌───────────────────┐  │
//! │  │ ServiceManager│─────▶│  StateStore       │  │
//! │  │ prepare/start │      │  rev + waiters    │  │
//! │  │ cancel/done   │      └───────────────────┘  │
//! │  └──────┬────────┘                              │
//! │         │ spawn                                 │
//! │  ┌──────▼────────┐      ┌───────────────────┐  │
//! │  │  Rebalancer   │─────▶│ placement engine  │  │
//! │  │ progress pump │      │ (pure)            │  │
//! │  └──────┬────────┘      └───────────────────┘  │
//! │         │                                       │
//! │  ┌──────▼────────┐  ┌──────────┐  ┌─────────┐  │
//! │  │ ProducerSup.  │  │ Metakv   │  │Topology │  │
//! │  │ (external)    │  │(external)│  │(external)│ │
//! │  └───────────────┘  └──────────┘  └─────────┘  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Consistency model
//!
//! - Within one node, state updates are totally ordered by a strictly
//!   monotonic revision and visible to every waiter registered before the
//!   update.
//! - Across nodes there is no ordering guarantee; the cluster manager's
//!   change ids and the metadata register's linearisability are the only
//!   global order.

#![recursion_limit = "256"]

pub mod config;
pub mod error;
pub mod functions;
pub mod manager;
pub mod metakv;
pub mod placement;
pub mod retry;
pub mod service;
pub mod state;
pub mod supervisor;
pub mod topology;
pub mod types;
pub mod validation;

pub use config::ServiceConfig;
pub use error::{Error, PlacementError, Result, StateError};
pub use service::Service;
pub use types::{
    NodeAddr, NodeId, NodeInfo, NodeVersion, State, Task, TaskList, TaskStatus, TaskType,
    Topology, TopologyChange, TopologyChangeType, Vbucket,
};

pub use functions::{BucketAlias, DeploymentConfig, FunctionDefinition, FunctionStore};
pub use manager::{DeployedFunctions, FunctionShard, ServiceManager, StaticFunctions};
pub use metakv::{MemoryRegister, MetadataRegister, MetakvClient};
pub use placement::{PlacementPlan, VbucketMap};
pub use retry::FixedBackoff;
pub use state::StateStore;
pub use supervisor::ProducerSupervisor;
pub use topology::{ClusterInfoSource, SnapshotStore, TopologySnapshot};
pub use validation::{validate_settings, ValidatedSettings, Validator};
