//! Topology discovery from the cluster-management tool's check report.
//!
//! The report is a sequence of line groups: a role line (`M:` or `S:`)
//! followed by exactly two continuation lines. For masters the continuation
//! lines carry the owned slot ranges and the replica count; for replicas they
//! carry the owning master's node id. Example:
//!
//! ```text
//! >>> Performing Cluster Check (using node 172.16.73.146:6379)
//! M: 4755e7640c7c54df1653911abd515001b85817bf 172.16.73.146:6379
//!    slots:0-5460 (5461 slots) master
//!    1 additional replica(s)
//! S: 8d2a1bde9aeb31c9e3bcf9b92dd34e52c1b1e4a2 172.16.73.150:6379
//!    slots: (0 slots) slave
//!    replicates 4755e7640c7c54df1653911abd515001b85817bf
//! [OK] All 16384 slots covered.
//! ```
//!
//! Fields are extracted by fixed positional token splitting, and any short
//! group or malformed token is a hard parse failure: a partially built
//! snapshot would make the rebalance planner compute an unsafe migration.

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised while parsing a cluster status report.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("truncated node group starting at: {0}")]
    TruncatedGroup(String),

    #[error("malformed report line: {0}")]
    MalformedLine(String),

    #[error("invalid slot range: {0}")]
    InvalidSlotRange(String),

    #[error("replica {replica_id} references unknown master {master_id}")]
    UnknownMaster {
        replica_id: String,
        master_id: String,
    },

    #[error("master {0} reports {1} replica(s) but {2} were linked")]
    ReplicaCountMismatch(String, usize, usize),

    #[error("status report contains no nodes")]
    EmptyReport,
}

/// Role of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Node owns a portion of the hash-slot space.
    Master,
    /// Node replicates a master.
    Replica,
}

/// A contiguous range of hash slots, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u32,
    pub end: u32,
}

impl SlotRange {
    /// Number of slots covered by this range.
    pub fn count(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Parse a range token like `0-5460` or a single slot like `5461`.
    pub fn parse(s: &str) -> Result<Self, DiscoveryError> {
        let parse_slot = |t: &str| {
            t.parse::<u32>()
                .map_err(|_| DiscoveryError::InvalidSlotRange(s.to_string()))
        };

        if let Some((start, end)) = s.split_once('-') {
            let range = SlotRange {
                start: parse_slot(start)?,
                end: parse_slot(end)?,
            };
            if range.start > range.end {
                return Err(DiscoveryError::InvalidSlotRange(s.to_string()));
            }
            Ok(range)
        } else {
            let slot = parse_slot(s)?;
            Ok(SlotRange {
                start: slot,
                end: slot,
            })
        }
    }
}

impl std::fmt::Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A single cluster member as reported by the management tool.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Opaque node identifier assigned by the cluster.
    pub id: String,
    /// Live IP address of the node.
    pub ip: String,
    /// Role at report time.
    pub role: NodeRole,
    /// Slot ranges owned by this node (masters only).
    pub slot_ranges: Vec<SlotRange>,
    /// Total owned slots as declared by the report (masters only).
    pub slot_count: u32,
    /// Ids of this master's replicas, back-linked during the second pass.
    pub slave_ids: Vec<String>,
    /// Owning master id (replicas only).
    pub master_id: Option<String>,
}

impl NodeRecord {
    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }
}

/// Live membership snapshot keyed by node IP.
///
/// Built fresh on every rebalance decision; the running cluster is the source
/// of truth for topology and snapshots are never cached across
/// reconciliations.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    pub nodes: HashMap<String, NodeRecord>,
}

/// One accumulated report group before records are built.
struct RawGroup {
    role: NodeRole,
    header: String,
    lines: Vec<String>,
}

impl TopologySnapshot {
    /// Parse a check report into a snapshot.
    ///
    /// Two passes: line groups are accumulated by role, then records are
    /// built and each replica is back-linked into its master's `slave_ids`.
    pub fn parse(report: &str) -> Result<Self, DiscoveryError> {
        let groups = collect_groups(report)?;
        if groups.is_empty() {
            return Err(DiscoveryError::EmptyReport);
        }

        let mut nodes: HashMap<String, NodeRecord> = HashMap::new();
        let mut declared_replicas: HashMap<String, usize> = HashMap::new();
        let mut id_to_ip: HashMap<String, String> = HashMap::new();

        // Masters first so replicas always find their owner.
        for group in groups.iter().filter(|g| g.role == NodeRole::Master) {
            let (id, ip) = parse_header(&group.header)?;
            let (slot_ranges, slot_count) = parse_master_slots(&group.lines[0])?;
            let replicas = parse_replica_count(&group.lines[1])?;

            declared_replicas.insert(id.clone(), replicas);
            id_to_ip.insert(id.clone(), ip.clone());
            nodes.insert(
                ip.clone(),
                NodeRecord {
                    id,
                    ip,
                    role: NodeRole::Master,
                    slot_ranges,
                    slot_count,
                    slave_ids: Vec::new(),
                    master_id: None,
                },
            );
        }

        for group in groups.iter().filter(|g| g.role == NodeRole::Replica) {
            let (id, ip) = parse_header(&group.header)?;
            let master_id = parse_replicates(&group.lines[1])?;

            let master_ip = id_to_ip.get(&master_id).cloned().ok_or_else(|| {
                DiscoveryError::UnknownMaster {
                    replica_id: id.clone(),
                    master_id: master_id.clone(),
                }
            })?;
            if let Some(master) = nodes.get_mut(&master_ip) {
                master.slave_ids.push(id.clone());
            }

            nodes.insert(
                ip.clone(),
                NodeRecord {
                    id,
                    ip,
                    role: NodeRole::Replica,
                    slot_ranges: Vec::new(),
                    slot_count: 0,
                    slave_ids: Vec::new(),
                    master_id: Some(master_id),
                },
            );
        }

        // The report's declared replica counts must match what was linked;
        // a mismatch means the report was truncated or misparsed.
        for record in nodes.values().filter(|n| n.is_master()) {
            let declared = declared_replicas.get(&record.id).copied().unwrap_or(0);
            if declared != record.slave_ids.len() {
                return Err(DiscoveryError::ReplicaCountMismatch(
                    record.id.clone(),
                    declared,
                    record.slave_ids.len(),
                ));
            }
        }

        Ok(TopologySnapshot { nodes })
    }

    /// Look up a node by IP.
    pub fn get(&self, ip: &str) -> Option<&NodeRecord> {
        self.nodes.get(ip)
    }

    /// All master records.
    pub fn masters(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values().filter(|n| n.is_master())
    }

    /// Number of masters in the snapshot.
    pub fn master_count(&self) -> usize {
        self.masters().count()
    }

    /// Total slots owned across all masters.
    pub fn total_slots(&self) -> u32 {
        self.masters().map(|m| m.slot_count).sum()
    }
}

fn collect_groups(report: &str) -> Result<Vec<RawGroup>, DiscoveryError> {
    let mut groups: Vec<RawGroup> = Vec::new();
    let mut current: Option<RawGroup> = None;

    for line in report.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(">>>") {
            continue;
        }
        // Summary line terminates the node listing.
        if trimmed.starts_with("[OK]") || trimmed.starts_with("[ERR]") {
            break;
        }

        let role = if trimmed.starts_with("M:") {
            Some(NodeRole::Master)
        } else if trimmed.starts_with("S:") {
            Some(NodeRole::Replica)
        } else {
            None
        };

        match role {
            Some(role) => {
                if let Some(open) = current.take() {
                    finish_group(open, &mut groups)?;
                }
                current = Some(RawGroup {
                    role,
                    header: trimmed.to_string(),
                    lines: Vec::new(),
                });
            }
            None => match current.as_mut() {
                Some(group) if group.lines.len() < 2 => {
                    group.lines.push(trimmed.to_string());
                }
                // A continuation line with no open group, or a third
                // continuation line, is not part of the grammar.
                _ => return Err(DiscoveryError::MalformedLine(trimmed.to_string())),
            },
        }
    }

    if let Some(open) = current.take() {
        finish_group(open, &mut groups)?;
    }
    Ok(groups)
}

fn finish_group(group: RawGroup, groups: &mut Vec<RawGroup>) -> Result<(), DiscoveryError> {
    if group.lines.len() != 2 {
        return Err(DiscoveryError::TruncatedGroup(group.header));
    }
    groups.push(group);
    Ok(())
}

/// `M: <id> <ip>:<port>` / `S: <id> <ip>:<port>`
fn parse_header(line: &str) -> Result<(String, String), DiscoveryError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(DiscoveryError::MalformedLine(line.to_string()));
    }
    let id = parts[1].to_string();
    let ip = parts[2]
        .split(':')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DiscoveryError::MalformedLine(line.to_string()))?
        .to_string();
    Ok((id, ip))
}

/// `slots:0-5460 (5461 slots) master` → ranges and declared count.
fn parse_master_slots(line: &str) -> Result<(Vec<SlotRange>, u32), DiscoveryError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(DiscoveryError::MalformedLine(line.to_string()));
    }

    let ranges_str = parts[0]
        .strip_prefix("slots:")
        .ok_or_else(|| DiscoveryError::MalformedLine(line.to_string()))?;
    let slot_ranges = ranges_str
        .split(',')
        .filter(|s| !s.is_empty())
        .map(SlotRange::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let slot_count: u32 = parts[1]
        .trim_start_matches('(')
        .parse()
        .map_err(|_| DiscoveryError::MalformedLine(line.to_string()))?;

    Ok((slot_ranges, slot_count))
}

/// `1 additional replica(s)` → declared replica count.
fn parse_replica_count(line: &str) -> Result<usize, DiscoveryError> {
    line.split_whitespace()
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| DiscoveryError::MalformedLine(line.to_string()))
}

/// `replicates <master-id>` → owning master id.
fn parse_replicates(line: &str) -> Result<String, DiscoveryError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["replicates", id] => Ok((*id).to_string()),
        _ => Err(DiscoveryError::MalformedLine(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
>>> Performing Cluster Check (using node 172.16.73.146:6379)
M: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1 172.16.73.146:6379
   slots:0-5460 (5461 slots) master
   2 additional replica(s)
M: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa2 172.16.73.147:6379
   slots:5461-10922 (5462 slots) master
   1 additional replica(s)
M: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa3 172.16.73.148:6379
   slots:10923-16383 (5461 slots) master
   1 additional replica(s)
S: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb1 172.16.73.150:6379
   slots: (0 slots) slave
   replicates aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1
S: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2 172.16.73.151:6379
   slots: (0 slots) slave
   replicates aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1
S: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb3 172.16.73.152:6379
   slots: (0 slots) slave
   replicates aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa2
S: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb4 172.16.73.153:6379
   slots: (0 slots) slave
   replicates aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa3
[OK] All 16384 slots covered.
";

    #[test]
    fn test_parse_report_roundtrip() {
        let snapshot = TopologySnapshot::parse(REPORT).expect("report should parse");

        assert_eq!(snapshot.nodes.len(), 7);
        assert_eq!(snapshot.master_count(), 3);
        assert_eq!(snapshot.total_slots(), 16384);

        // Back-links match the constructed relationships exactly.
        let m1 = snapshot.get("172.16.73.146").expect("master 1");
        assert!(m1.is_master());
        assert_eq!(m1.slot_count, 5461);
        assert_eq!(
            m1.slave_ids,
            vec![
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb1".to_string(),
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2".to_string(),
            ]
        );

        let m2 = snapshot.get("172.16.73.147").expect("master 2");
        assert_eq!(
            m2.slave_ids,
            vec!["bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb3".to_string()]
        );

        let m3 = snapshot.get("172.16.73.148").expect("master 3");
        assert_eq!(
            m3.slave_ids,
            vec!["bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb4".to_string()]
        );

        let s1 = snapshot.get("172.16.73.150").expect("replica 1");
        assert_eq!(s1.role, NodeRole::Replica);
        assert_eq!(s1.master_id.as_deref(), Some(m1.id.as_str()));
    }

    #[test]
    fn test_parse_slot_ranges() {
        let snapshot = TopologySnapshot::parse(REPORT).expect("report should parse");
        let m1 = snapshot.get("172.16.73.146").expect("master 1");
        assert_eq!(m1.slot_ranges, vec![SlotRange { start: 0, end: 5460 }]);
        assert_eq!(m1.slot_ranges[0].count(), 5461);
    }

    #[test]
    fn test_truncated_group_is_hard_failure() {
        let truncated = "\
M: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1 172.16.73.146:6379
   slots:0-5460 (5461 slots) master
";
        let err = TopologySnapshot::parse(truncated).expect_err("must fail");
        assert!(matches!(err, DiscoveryError::TruncatedGroup(_)));
    }

    #[test]
    fn test_short_header_is_hard_failure() {
        let malformed = "\
M: 172.16.73.146:6379
   slots:0-5460 (5461 slots) master
   0 additional replica(s)
";
        assert!(TopologySnapshot::parse(malformed).is_err());
    }

    #[test]
    fn test_unknown_master_reference_is_hard_failure() {
        let report = "\
M: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1 172.16.73.146:6379
   slots:0-16383 (16384 slots) master
   0 additional replica(s)
S: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb1 172.16.73.150:6379
   slots: (0 slots) slave
   replicates ffffffffffffffffffffffffffffffffffffffff
";
        let err = TopologySnapshot::parse(report).expect_err("must fail");
        assert!(matches!(err, DiscoveryError::UnknownMaster { .. }));
    }

    #[test]
    fn test_replica_count_mismatch_is_hard_failure() {
        let report = "\
M: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1 172.16.73.146:6379
   slots:0-16383 (16384 slots) master
   2 additional replica(s)
S: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb1 172.16.73.150:6379
   slots: (0 slots) slave
   replicates aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1
";
        let err = TopologySnapshot::parse(report).expect_err("must fail");
        assert!(matches!(err, DiscoveryError::ReplicaCountMismatch(_, 2, 1)));
    }

    #[test]
    fn test_empty_report_is_hard_failure() {
        let err = TopologySnapshot::parse(">>> Performing Cluster Check\n").expect_err("must fail");
        assert!(matches!(err, DiscoveryError::EmptyReport));
    }

    #[test]
    fn test_multiple_slot_ranges() {
        let report = "\
M: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1 172.16.73.146:6379
   slots:0-100,200-300 (202 slots) master
   0 additional replica(s)
[OK] All 16384 slots covered.
";
        let snapshot = TopologySnapshot::parse(report).expect("report should parse");
        let master = snapshot.get("172.16.73.146").expect("master");
        assert_eq!(master.slot_ranges.len(), 2);
        assert_eq!(master.slot_count, 202);
    }

    #[test]
    fn test_slot_range_parse() {
        assert_eq!(
            SlotRange::parse("0-5460").expect("range"),
            SlotRange { start: 0, end: 5460 }
        );
        assert_eq!(
            SlotRange::parse("5461").expect("single"),
            SlotRange {
                start: 5461,
                end: 5461
            }
        );
        assert!(SlotRange::parse("10-5").is_err());
        assert!(SlotRange::parse("x-y").is_err());
    }
}
