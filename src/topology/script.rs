//! Automation script rendering for the cluster-management tool.
//!
//! Renders a rebalance plan (or a bootstrap request) into an ordered shell
//! script body. Two forms exist:
//!
//! - **Bootstrap**: a single `redis-trib create` invocation wrapped in an
//!   `expect` driver, because the tool demands an interactive `yes` before
//!   finalizing cluster creation.
//! - **Grow/shrink**: a plain ordered sequence of add/remove/reshard
//!   invocations, each followed by a settle delay - the tool's cluster-state
//!   propagation is asynchronous and issuing the next structural command too
//!   soon corrupts cluster consensus.
//!
//! Rendering is pure; `write_script` persists a body to disk and marks it
//! executable.

use std::path::Path;

use super::planner::{RebalancePlan, TopologyOperation};

/// Client port appended to bare node IPs when rendering commands.
const CLIENT_PORT: i32 = 6379;

/// Seconds to wait after each structural command.
pub const SETTLE_DELAY_SECS: u32 = 5;

/// Render the cluster-bootstrap script.
///
/// `node_addrs` must list every node of the new cluster in ordinal order as
/// `ip:port` endpoints; the tool assigns master/replica roles itself from the
/// replication factor.
pub fn render_bootstrap_script(node_addrs: &[String], replication_factor: u32) -> String {
    let command = format!(
        "redis-trib create --replicas {} {}",
        replication_factor,
        node_addrs.join(" ")
    );

    format!(
        r#"#!/bin/bash

auto_create_cluster() {{
    expect -c "set timeout -1;
        spawn {command};
        expect {{
            *accept): {{send -- yes\r;exp_continue;}}
            eof {{exit 0;}}
        }}";
}}

## call func
auto_create_cluster
"#
    )
}

/// Render a grow/shrink plan into an ordered script body.
///
/// `coordinator` is the `ip:port` endpoint of any live cluster member,
/// used by membership commands to reach the existing cluster.
pub fn render_plan_script(plan: &RebalancePlan, coordinator: &str) -> String {
    let mut commands = String::new();
    for op in &plan.operations {
        commands.push_str(&render_operation(op, coordinator));
        commands.push_str(&format!("sleep {};\n", SETTLE_DELAY_SECS));
    }

    format!(
        r#"#!/bin/bash

scale_cluster() {{
{commands}}}

## call func
scale_cluster
"#
    )
}

fn render_operation(op: &TopologyOperation, coordinator: &str) -> String {
    match op {
        TopologyOperation::AddMaster { ip } => {
            format!("redis-trib add-node {}:{} {};\n", ip, CLIENT_PORT, coordinator)
        }
        TopologyOperation::AddSlave { ip, master_ip } => format!(
            "redis-trib add-node --slave {}:{} {}:{};\n",
            ip, CLIENT_PORT, master_ip, CLIENT_PORT
        ),
        TopologyOperation::Reshard {
            from,
            to_id,
            slot_count,
            coordinator,
        } => format!(
            "redis-trib reshard --from {} --to {} --slots {} --yes {};\n",
            from, to_id, slot_count, coordinator
        ),
        TopologyOperation::RemoveSlave {
            slave_id,
            coordinator,
        } => format!("redis-trib del-node {} {};\n", coordinator, slave_id),
        TopologyOperation::RemoveMaster {
            master_id,
            coordinator,
        } => format!("redis-trib del-node {} {};\n", coordinator, master_id),
    }
}

/// Write a script body to `path` and mark it executable (0755).
pub async fn write_script(path: &Path, body: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::write(path, body).await?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::planner::ReshardSource;

    const COORDINATOR: &str = "10.0.0.0:6379";

    #[test]
    fn test_render_bootstrap_script() {
        let addrs: Vec<String> = (0..6).map(|i| format!("10.0.0.{}:6379", i)).collect();
        let script = render_bootstrap_script(&addrs, 1);

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("expect -c"));
        assert!(script.contains("send -- yes"));
        assert!(script.contains(
            "spawn redis-trib create --replicas 1 \
             10.0.0.0:6379 10.0.0.1:6379 10.0.0.2:6379 10.0.0.3:6379 10.0.0.4:6379 10.0.0.5:6379"
        ));
    }

    #[test]
    fn test_render_plan_script_order_and_settle() {
        let plan = RebalancePlan {
            operations: vec![
                TopologyOperation::AddMaster {
                    ip: "10.0.0.6".to_string(),
                },
                TopologyOperation::AddSlave {
                    ip: "10.0.0.7".to_string(),
                    master_ip: "10.0.0.6".to_string(),
                },
                TopologyOperation::Reshard {
                    from: ReshardSource::All,
                    to_id: "new-master-id".to_string(),
                    slot_count: 4096,
                    coordinator: COORDINATOR.to_string(),
                },
            ],
        };

        let script = render_plan_script(&plan, COORDINATOR);

        let add = script
            .find("redis-trib add-node 10.0.0.6:6379 10.0.0.0:6379;")
            .expect("add-node present");
        let slave = script
            .find("redis-trib add-node --slave 10.0.0.7:6379 10.0.0.6:6379;")
            .expect("add-node --slave present");
        let reshard = script
            .find("redis-trib reshard --from all --to new-master-id --slots 4096 --yes 10.0.0.0:6379;")
            .expect("reshard present");

        // Rendered order follows plan order.
        assert!(add < slave && slave < reshard);

        // One settle delay per operation.
        assert_eq!(script.matches("sleep 5;").count(), 3);
    }

    #[test]
    fn test_render_removal_commands() {
        let plan = RebalancePlan {
            operations: vec![
                TopologyOperation::RemoveSlave {
                    slave_id: "slave-id".to_string(),
                    coordinator: COORDINATOR.to_string(),
                },
                TopologyOperation::Reshard {
                    from: ReshardSource::Node("old-master-id".to_string()),
                    to_id: "survivor-id".to_string(),
                    slot_count: 2730,
                    coordinator: COORDINATOR.to_string(),
                },
                TopologyOperation::RemoveMaster {
                    master_id: "old-master-id".to_string(),
                    coordinator: COORDINATOR.to_string(),
                },
            ],
        };

        let script = render_plan_script(&plan, COORDINATOR);

        assert!(script.contains("redis-trib del-node 10.0.0.0:6379 slave-id;"));
        assert!(script.contains(
            "redis-trib reshard --from old-master-id --to survivor-id --slots 2730 --yes 10.0.0.0:6379;"
        ));
        assert!(script.contains("redis-trib del-node 10.0.0.0:6379 old-master-id;"));
    }

    #[tokio::test]
    async fn test_write_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!(
            "topology-script-test-{}",
            crate::resources::common::random_suffix(8)
        ));
        tokio::fs::create_dir_all(&dir).await.expect("temp dir");
        let path = dir.join("cluster-topology.sh");

        write_script(&path, "#!/bin/bash\ntrue\n")
            .await
            .expect("write script");

        let meta = tokio::fs::metadata(&path).await.expect("metadata");
        assert_eq!(meta.permissions().mode() & 0o777, 0o755);

        tokio::fs::remove_dir_all(&dir).await.expect("cleanup");
    }
}
