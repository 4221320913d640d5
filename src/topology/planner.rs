//! Rebalance planning - computes membership and slot-migration operations.
//!
//! Plans are pure data: nothing here performs I/O or talks to the cluster, so
//! grow and shrink sequencing can be unit-tested without a live cluster or
//! the external management tool.

use thiserror::Error;

use super::discovery::TopologySnapshot;

/// Total number of hash slots in the cluster key space.
///
/// This is the canonical total used for every share computation. Using a
/// smaller quantum here would leave newly added masters permanently
/// underweighted relative to the existing ones.
pub const TOTAL_SLOTS: u32 = 16384;

/// Planner tunables.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Total addressable slot space, shared by grow-share computations.
    pub total_slots: u32,
    /// Replicas attached to each new master during grow.
    pub replication_factor: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            total_slots: TOTAL_SLOTS,
            replication_factor: 1,
        }
    }
}

/// Errors raised while computing a rebalance plan.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("node {0} is not present in the topology snapshot")]
    UnknownNode(String),

    #[error("node {0} is not a master in the topology snapshot")]
    NotAMaster(String),

    #[error("shrink requires at least one surviving master")]
    NoSurvivingMasters,
}

/// Source selector for a reshard operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReshardSource {
    /// Drain evenly from every current master.
    All,
    /// Drain from one specific master.
    Node(String),
}

impl std::fmt::Display for ReshardSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReshardSource::All => write!(f, "all"),
            ReshardSource::Node(id) => write!(f, "{}", id),
        }
    }
}

/// One step of a rebalance plan. Steps execute strictly in emitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyOperation {
    /// Join a new node to the cluster as a master.
    AddMaster { ip: String },
    /// Join a new node to the cluster as a replica of `master_ip`.
    AddSlave { ip: String, master_ip: String },
    /// Move `slot_count` slots into `to_id`, coordinated through
    /// `coordinator` (an `ip:port` endpoint of any live cluster member).
    Reshard {
        from: ReshardSource,
        to_id: String,
        slot_count: u32,
        coordinator: String,
    },
    /// Remove a replica from the cluster.
    RemoveSlave { slave_id: String, coordinator: String },
    /// Remove a (fully drained) master from the cluster.
    RemoveMaster {
        master_id: String,
        coordinator: String,
    },
}

/// Ordered sequence of topology operations.
#[derive(Debug, Clone, Default)]
pub struct RebalancePlan {
    pub operations: Vec<TopologyOperation>,
}

impl RebalancePlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

/// A node being added during a grow operation.
///
/// The node id is resolved by the executor before planning: membership
/// commands are rendered against IPs, but the reshard that follows needs the
/// new master's cluster identifier.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub ordinal: i32,
    pub ip: String,
    pub node_id: String,
}

/// Compute a grow plan.
///
/// New nodes partition into groups of `1 + replication_factor`: the first
/// node of each group joins as a master, the rest as its replicas. After each
/// group's membership operations, one reshard moves an equal share of the
/// slot space into the new master, computed as `total_slots / (masters + 1)`
/// with the master count incremented after each group - shares shrink
/// monotonically as masters are added.
pub fn plan_grow(
    current_master_count: u32,
    new_nodes: &[NewNode],
    coordinator: &str,
    config: &PlannerConfig,
) -> RebalancePlan {
    let mut operations = Vec::new();
    let mut master_count = current_master_count;
    let group_size = 1 + config.replication_factor as usize;

    for group in new_nodes.chunks(group_size) {
        let master = &group[0];
        operations.push(TopologyOperation::AddMaster {
            ip: master.ip.clone(),
        });
        for replica in &group[1..] {
            operations.push(TopologyOperation::AddSlave {
                ip: replica.ip.clone(),
                master_ip: master.ip.clone(),
            });
        }

        operations.push(TopologyOperation::Reshard {
            from: ReshardSource::All,
            to_id: master.node_id.clone(),
            slot_count: config.total_slots / (master_count + 1),
            coordinator: coordinator.to_string(),
        });
        master_count += 1;
    }

    RebalancePlan { operations }
}

/// Compute a shrink plan.
///
/// `removal_ips` must be ordered highest ordinal first;
/// `survivor_master_ips` are the masters that remain, in ordinal order.
///
/// Replica removals are deduplicated by id: a master's replicas are evicted
/// as part of the master's own removal, so a directly targeted replica that
/// was already queued is skipped. Each removed master is drained by one
/// reshard per surviving master, evenly split with the last survivor
/// absorbing the remainder so the drained total equals the master's full
/// allocation, and only then removed.
pub fn plan_shrink(
    snapshot: &TopologySnapshot,
    removal_ips: &[String],
    survivor_master_ips: &[String],
    coordinator: &str,
) -> Result<RebalancePlan, PlanError> {
    if survivor_master_ips.is_empty() {
        return Err(PlanError::NoSurvivingMasters);
    }

    let survivor_ids: Vec<String> = survivor_master_ips
        .iter()
        .map(|ip| {
            let record = snapshot
                .get(ip)
                .ok_or_else(|| PlanError::UnknownNode(ip.clone()))?;
            if !record.is_master() {
                return Err(PlanError::NotAMaster(ip.clone()));
            }
            Ok(record.id.clone())
        })
        .collect::<Result<_, _>>()?;

    let mut operations = Vec::new();
    let mut removed_slave_ids: Vec<String> = Vec::new();

    for ip in removal_ips {
        let record = snapshot
            .get(ip)
            .ok_or_else(|| PlanError::UnknownNode(ip.clone()))?;

        if record.is_master() {
            for slave_id in &record.slave_ids {
                operations.push(TopologyOperation::RemoveSlave {
                    slave_id: slave_id.clone(),
                    coordinator: coordinator.to_string(),
                });
                removed_slave_ids.push(slave_id.clone());
            }

            // Drain the master's full allocation across the survivors; the
            // last target absorbs the division remainder.
            let share = record.slot_count / survivor_ids.len() as u32;
            let mut drained = 0;
            for (idx, target_id) in survivor_ids.iter().enumerate() {
                let count = if idx + 1 == survivor_ids.len() {
                    record.slot_count - drained
                } else {
                    share
                };
                drained += count;
                if count == 0 {
                    continue;
                }
                operations.push(TopologyOperation::Reshard {
                    from: ReshardSource::Node(record.id.clone()),
                    to_id: target_id.clone(),
                    slot_count: count,
                    coordinator: coordinator.to_string(),
                });
            }

            operations.push(TopologyOperation::RemoveMaster {
                master_id: record.id.clone(),
                coordinator: coordinator.to_string(),
            });
        } else if !removed_slave_ids.contains(&record.id) {
            operations.push(TopologyOperation::RemoveSlave {
                slave_id: record.id.clone(),
                coordinator: coordinator.to_string(),
            });
            removed_slave_ids.push(record.id.clone());
        }
    }

    Ok(RebalancePlan { operations })
}
