//! Error types for the topology executor.

use thiserror::Error;

use crate::topology::{DiscoveryError, PlanError};

/// Errors raised by a single executor invocation.
///
/// Environment errors are fatal to the invocation and must not be retried
/// automatically; everything else surfaces through the Job's exit status and
/// is acted on by the next reconciliation.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("environment misconfiguration: {0}")]
    Environment(#[from] envy::Error),

    #[error("required environment variable missing or empty: {0}")]
    MissingVariable(String),

    #[error("invalid environment variable: {0}")]
    InvalidVariable(String),

    #[error("cluster nodes not ready within {0:?}")]
    ReadinessTimeout(std::time::Duration),

    #[error("failed to resolve address of node {0}")]
    Unresolvable(String),

    #[error("cluster-management tool failed: {0}")]
    Tool(String),

    #[error("topology parse failure: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("rebalance planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
