//! Custom Resource Definitions for the operator.

pub mod redis_cluster;

pub use redis_cluster::{
    CLIENT_PORT, CLUSTER_BUS_PORT, ClusterPhase, Condition, LAST_APPLIED_ANNOTATION, RedisCluster,
    RedisClusterSpec, RedisClusterStatus, node_fqdn,
};
