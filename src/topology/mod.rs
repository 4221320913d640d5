//! Cluster topology management.
//!
//! Everything in this module is pure computation over data obtained from the
//! cluster-management tool:
//!
//! - `discovery`: parse a live cluster's check report into a
//!   `TopologySnapshot`
//! - `planner`: compute an ordered `RebalancePlan` for grow/shrink
//! - `script`: render a plan into the tool's automation script
//!
//! The executor module owns all I/O (readiness probing, running the tool,
//! writing scripts to disk).

pub mod discovery;
pub mod planner;
pub mod script;

pub use discovery::{DiscoveryError, NodeRecord, NodeRole, TopologySnapshot};
pub use planner::{
    NewNode, PlanError, PlannerConfig, RebalancePlan, ReshardSource, TopologyOperation,
    TOTAL_SLOTS,
};
