//! Executor orchestration.
//!
//! Runs inside the transient Job pod. Gates on node readiness, gathers
//! whatever live state the operation needs, computes a plan, and writes the
//! automation script that the Job's shell then executes. The executor never
//! mutates Kubernetes resources; its only outputs are the script file and
//! the process exit status.

use std::path::Path;

use tracing::info;

use super::config::{ExecutorConfig, OperationType};
use super::error::ExecutorError;
use super::readiness::{ReadinessGate, TimeoutPolicy, resolve_node_ip};
use super::tool;
use crate::crd::node_fqdn;
use crate::topology::{
    NewNode, PlannerConfig, TopologySnapshot,
    planner::{plan_grow, plan_shrink},
    script,
};

/// Path of the generated automation script; the Job command runs it after
/// this binary exits successfully.
pub const SCRIPT_PATH: &str = "/tmp/cluster-topology.sh";

/// Execute one topology operation per the environment contract.
pub async fn run(config: &ExecutorConfig) -> Result<(), ExecutorError> {
    match config.operation_type {
        OperationType::Create => run_create(config).await,
        OperationType::Scale => run_scale(config).await,
    }
}

async fn run_create(config: &ExecutorConfig) -> Result<(), ExecutorError> {
    // Checked during config validation.
    let size = config
        .cluster_size
        .ok_or_else(|| ExecutorError::MissingVariable("CLUSTER_SIZE".to_string()))?;

    gate(config, size).await?;

    let mut addrs = Vec::with_capacity(size as usize);
    for ordinal in 0..size {
        let ip = resolve_ordinal(config, ordinal).await?;
        addrs.push(format!("{}:6379", ip));
    }

    let planner = PlannerConfig::default();
    let body = script::render_bootstrap_script(&addrs, planner.replication_factor);
    script::write_script(Path::new(SCRIPT_PATH), &body).await?;

    info!(cluster = %config.cluster_name, nodes = size, "Bootstrap script written");
    Ok(())
}

async fn run_scale(config: &ExecutorConfig) -> Result<(), ExecutorError> {
    let old = config
        .old_cluster_size
        .ok_or_else(|| ExecutorError::MissingVariable("OLD_CLUSTER_SIZE".to_string()))?;
    let new = config
        .new_cluster_size
        .ok_or_else(|| ExecutorError::MissingVariable("NEW_CLUSTER_SIZE".to_string()))?;

    // Every node involved in the transition must be listening, whichever
    // direction the cluster is moving.
    gate(config, old.max(new)).await?;

    let coordinator_ip = resolve_ordinal(config, 0).await?;
    let coordinator = format!("{}:6379", coordinator_ip);
    let planner = PlannerConfig::default();

    let plan = if new > old {
        // Grow: resolve the new ordinals and their cluster identifiers, then
        // plan membership and reshard operations.
        let mut new_nodes = Vec::with_capacity((new - old) as usize);
        for ordinal in old..new {
            let ip = resolve_ordinal(config, ordinal).await?;
            let node_id = tool::fetch_node_id(&ip).await?;
            new_nodes.push(NewNode {
                ordinal,
                ip,
                node_id,
            });
        }

        let current_masters = old as u32 / (1 + planner.replication_factor);
        plan_grow(current_masters, &new_nodes, &coordinator, &planner)
    } else {
        // Shrink: the live cluster is the source of truth for which removed
        // ordinals are masters; parse a fresh snapshot, then walk removals
        // from the highest ordinal down.
        let report = tool::fetch_cluster_status(&coordinator).await?;
        let snapshot = TopologySnapshot::parse(&report)?;

        let mut removals = Vec::with_capacity((old - new) as usize);
        for ordinal in (new..old).rev() {
            removals.push(resolve_ordinal(config, ordinal).await?);
        }

        let surviving_masters = new as u32 / (1 + planner.replication_factor);
        let mut survivors = Vec::with_capacity(surviving_masters as usize);
        for ordinal in 0..surviving_masters as i32 {
            survivors.push(resolve_ordinal(config, ordinal).await?);
        }

        plan_shrink(&snapshot, &removals, &survivors, &coordinator)?
    };

    let body = script::render_plan_script(&plan, &coordinator);
    script::write_script(Path::new(SCRIPT_PATH), &body).await?;

    info!(
        cluster = %config.cluster_name,
        old,
        new,
        operations = plan.len(),
        "Scale script written"
    );
    Ok(())
}

async fn gate(config: &ExecutorConfig, expected: i32) -> Result<(), ExecutorError> {
    let policy = TimeoutPolicy::default();
    let deadline = policy.deadline;
    let gate = ReadinessGate::new(&config.cluster_name, &config.namespace, expected, policy);
    if !gate.wait_ready().await {
        return Err(ExecutorError::ReadinessTimeout(deadline));
    }
    Ok(())
}

async fn resolve_ordinal(config: &ExecutorConfig, ordinal: i32) -> Result<String, ExecutorError> {
    let fqdn = node_fqdn(&config.cluster_name, ordinal, &config.namespace);
    resolve_node_ip(&fqdn)
        .await
        .ok_or(ExecutorError::Unresolvable(fqdn))
}
