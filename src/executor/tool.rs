//! Driver for the external cluster-management tool.
//!
//! Thin wrapper over `redis-trib` invocations: fetching a live cluster's
//! check report and resolving a node's cluster identifier. Output parsing
//! lives in `topology::discovery`; this module only runs the tool.

use tokio::process::Command;
use tracing::debug;

use super::error::ExecutorError;
use crate::topology::TopologySnapshot;

/// Name of the management tool binary expected on the executor image's PATH.
const TOOL: &str = "redis-trib";

/// Fetch the cluster check report by querying one live node.
pub async fn fetch_cluster_status(endpoint: &str) -> Result<String, ExecutorError> {
    run_check(endpoint).await
}

/// Resolve a node's cluster identifier by checking the node itself.
///
/// Works both for joined members and for fresh standalone nodes about to be
/// added: either way the node reports itself with its own id.
pub async fn fetch_node_id(ip: &str) -> Result<String, ExecutorError> {
    let endpoint = format!("{}:6379", ip);
    let report = run_check(&endpoint).await?;
    let snapshot = TopologySnapshot::parse(&report)?;
    snapshot
        .get(ip)
        .map(|record| record.id.clone())
        .ok_or_else(|| {
            ExecutorError::Tool(format!("node {} missing from its own check report", ip))
        })
}

async fn run_check(endpoint: &str) -> Result<String, ExecutorError> {
    debug!(endpoint = %endpoint, "Running cluster check");
    let output = Command::new(TOOL)
        .arg("check")
        .arg(endpoint)
        .output()
        .await
        .map_err(|e| ExecutorError::Tool(format!("failed to spawn {}: {}", TOOL, e)))?;

    if !output.status.success() {
        return Err(ExecutorError::Tool(format!(
            "{} check {} exited with {}: {}",
            TOOL,
            endpoint,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
