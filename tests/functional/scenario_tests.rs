//! End-to-end scenarios over the pure topology pipeline:
//! check report -> snapshot -> plan -> rendered script.

use rediscluster_operator::topology::{
    NewNode, PlannerConfig, TopologyOperation, TopologySnapshot,
    planner::{plan_grow, plan_shrink},
    script::{render_bootstrap_script, render_plan_script},
};

const COORDINATOR: &str = "10.0.0.0:6379";

/// A check report for a six-node cluster laid out the way the bootstrap
/// creates it: ordinals 0-2 are masters, ordinals 3-5 their replicas.
fn six_node_report() -> String {
    let master_id = |i: usize| format!("{:m<40}", format!("master{}", i));
    let slave_id = |i: usize| format!("{:s<40}", format!("slave{}", i));

    let mut report = String::from(">>> Performing Cluster Check (using node 10.0.0.0:6379)\n");
    let ranges = ["0-5461", "5462-10922", "10923-16383"];
    let counts = [5462, 5461, 5461];
    for i in 0..3 {
        report.push_str(&format!(
            "M: {} 10.0.0.{}:6379\n   slots:{} ({} slots) master\n   1 additional replica(s)\n",
            master_id(i),
            i,
            ranges[i],
            counts[i],
        ));
    }
    for i in 0..3 {
        report.push_str(&format!(
            "S: {} 10.0.0.{}:6379\n   slots: (0 slots) slave\n   replicates {}\n",
            slave_id(i),
            i + 3,
            master_id(i),
        ));
    }
    report.push_str("[OK] All 16384 slots covered.\n");
    report
}

#[test]
fn test_snapshot_reflects_bootstrap_layout() {
    let snapshot = TopologySnapshot::parse(&six_node_report()).unwrap();

    assert_eq!(snapshot.master_count(), 3);
    assert_eq!(snapshot.total_slots(), 16384);
    for i in 0..3 {
        let master = snapshot.get(&format!("10.0.0.{}", i)).unwrap();
        assert_eq!(master.slave_ids.len(), 1);
    }
}

#[test]
fn test_grow_six_to_eight_end_to_end() {
    // Growing 6 -> 8 adds one master (ordinal 6) and one replica (ordinal 7),
    // then moves 16384 / (3 + 1) = 4096 slots into the new master.
    let new_nodes = vec![
        NewNode {
            ordinal: 6,
            ip: "10.0.0.6".to_string(),
            node_id: format!("{:m<40}", "master3"),
        },
        NewNode {
            ordinal: 7,
            ip: "10.0.0.7".to_string(),
            node_id: format!("{:s<40}", "slave3"),
        },
    ];

    let plan = plan_grow(3, &new_nodes, COORDINATOR, &PlannerConfig::default());
    assert_eq!(plan.len(), 3);

    let TopologyOperation::Reshard { slot_count, .. } = &plan.operations[2] else {
        panic!("third operation must be the reshard");
    };
    assert_eq!(*slot_count, 4096);

    let script = render_plan_script(&plan, COORDINATOR);
    let add = script.find("add-node 10.0.0.6:6379").unwrap();
    let slave = script.find("add-node --slave 10.0.0.7:6379").unwrap();
    let reshard = script.find("reshard --from all").unwrap();
    assert!(add < slave && slave < reshard);
}

#[test]
fn test_shrink_eight_to_six_end_to_end() {
    // An eight-node cluster: the six-node layout plus a fourth master
    // (ordinal 6, holding 4096 slots taken evenly) and its replica.
    let master_id = |i: usize| format!("{:m<40}", format!("master{}", i));
    let report = format!(
        ">>> Performing Cluster Check (using node 10.0.0.0:6379)\n\
         M: {m0} 10.0.0.0:6379\n   slots:1366-5461 (4096 slots) master\n   1 additional replica(s)\n\
         M: {m1} 10.0.0.1:6379\n   slots:6828-10922 (4095 slots) master\n   1 additional replica(s)\n\
         M: {m2} 10.0.0.2:6379\n   slots:12289-16383 (4095 slots) master\n   1 additional replica(s)\n\
         M: {m3} 10.0.0.6:6379\n   slots:0-1365,5462-6827,10923-12288 (4098 slots) master\n   1 additional replica(s)\n\
         S: {s0} 10.0.0.3:6379\n   slots: (0 slots) slave\n   replicates {m0}\n\
         S: {s1} 10.0.0.4:6379\n   slots: (0 slots) slave\n   replicates {m1}\n\
         S: {s2} 10.0.0.5:6379\n   slots: (0 slots) slave\n   replicates {m2}\n\
         S: {s3} 10.0.0.7:6379\n   slots: (0 slots) slave\n   replicates {m3}\n\
         [OK] All 16384 slots covered.\n",
        m0 = master_id(0),
        m1 = master_id(1),
        m2 = master_id(2),
        m3 = master_id(3),
        s0 = format!("{:s<40}", "slave0"),
        s1 = format!("{:s<40}", "slave1"),
        s2 = format!("{:s<40}", "slave2"),
        s3 = format!("{:s<40}", "slave3"),
    );

    let snapshot = TopologySnapshot::parse(&report).unwrap();
    assert_eq!(snapshot.master_count(), 4);

    // Remove ordinals 7 then 6; masters 0-2 survive.
    let removals = vec!["10.0.0.7".to_string(), "10.0.0.6".to_string()];
    let survivors: Vec<String> = (0..3).map(|i| format!("10.0.0.{}", i)).collect();

    let plan = plan_shrink(&snapshot, &removals, &survivors, COORDINATOR).unwrap();

    // The departing master's full allocation is drained, nothing lost.
    let drained: u32 = plan
        .operations
        .iter()
        .filter_map(|op| match op {
            TopologyOperation::Reshard { slot_count, .. } => Some(*slot_count),
            _ => None,
        })
        .sum();
    assert_eq!(drained, 4098);

    // The replica is evicted exactly once even though it was also a direct
    // removal target, and the master goes last.
    let slave_removals = plan
        .operations
        .iter()
        .filter(|op| matches!(op, TopologyOperation::RemoveSlave { .. }))
        .count();
    assert_eq!(slave_removals, 1);
    assert!(matches!(
        plan.operations.last(),
        Some(TopologyOperation::RemoveMaster { .. })
    ));

    let script = render_plan_script(&plan, COORDINATOR);
    assert_eq!(script.matches("sleep 5;").count(), plan.len());
}

#[test]
fn test_bootstrap_script_covers_every_ordinal() {
    let addrs: Vec<String> = (0..6).map(|i| format!("10.0.0.{}:6379", i)).collect();
    let script = render_bootstrap_script(&addrs, 1);

    for addr in &addrs {
        assert!(script.contains(addr.as_str()));
    }
    assert!(script.contains("--replicas 1"));
    // The tool demands an interactive confirmation; the wrapper answers it.
    assert!(script.contains("expect"));
    assert!(script.contains("send -- yes"));
}

#[test]
fn test_corrupt_report_never_reaches_the_planner() {
    // A report that loses a replica's continuation lines must fail parsing
    // outright rather than produce a partial snapshot.
    let report = six_node_report().replace("   replicates ", "   replicated-by ");
    assert!(TopologySnapshot::parse(&report).is_err());
}
