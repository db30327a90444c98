//! Rebalance coordination.
//!
//! [`ServiceManager`] is the per-node participant in the cluster manager's
//! prepare / start / cancel protocol. It owns the revisioned state that
//! long-pollers observe, the at-most-one rebalance context, and the
//! background rebalancer that re-seats workers through the producer
//! supervisor.
//!
//! ```text
//!        Idle ── prepare ──▶ Prepared ── start ──▶ Running ─┬─ done(ok) ─▶ Idle
//!                                                          ├─ done(err) ▶ Failed
//!                                                          └─ cancel ───▶ Idle
//!        Failed ── cancel ─▶ Idle
//! ```
//!
//! Every publish goes through the state store, so observers see a strictly
//! monotonic revision. `cancel` wins races with `done`: cancelling clears
//! the context under the lock before the rebalancer's completion callback
//! can observe it, and that callback checks the context's cancellation
//! token before acting.

mod rebalancer;
mod service_manager;

pub use rebalancer::{DeployedFunctions, FunctionShard, StaticFunctions};
pub use service_manager::ServiceManager;
