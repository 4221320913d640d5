//! RedisCluster Custom Resource Definition.
//!
//! Defines the RedisCluster CRD for deploying and managing sharded,
//! replicated Redis clusters on Kubernetes.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation on the RedisCluster holding the serialized spec that was last
/// successfully applied. Used to diff desired state against the previous
/// reconciled generation; absent or unparseable content means "no prior
/// applied spec".
pub const LAST_APPLIED_ANNOTATION: &str = "rediscluster.k8s.io/last-applied-spec";

/// RedisCluster is a custom resource for deploying Redis clusters.
///
/// Example:
/// ```yaml
/// apiVersion: rediscluster.k8s.io/v1alpha1
/// kind: RedisCluster
/// metadata:
///   name: my-cluster
/// spec:
///   replicas: 6
///   image: redis:5-alpine
///   clusterModeEnabled: true
///   storage:
///     size: 10Gi
/// ```
#[derive(CustomResource, Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "rediscluster.k8s.io",
    version = "v1alpha1",
    kind = "RedisCluster",
    plural = "redisclusters",
    shortname = "rc",
    status = "RedisClusterStatus",
    namespaced,
    // Print columns for kubectl get
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    /// Total number of cluster nodes (masters plus replicas).
    /// With the default replication factor of 1, a cluster of 6 is
    /// 3 masters with one replica each.
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Redis container image.
    #[serde(default = "default_image")]
    pub image: String,

    /// Run the store in cluster mode. Topology management requires this.
    #[serde(default = "default_cluster_mode")]
    pub cluster_mode_enabled: bool,

    /// Persistent storage configuration.
    #[serde(default)]
    pub storage: StorageSpec,

    /// Resource requests and limits for cluster pods.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,

    /// Images for the transient topology Jobs.
    #[serde(default)]
    pub tool_images: ToolImagesSpec,
}

impl Default for RedisClusterSpec {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            image: default_image(),
            cluster_mode_enabled: default_cluster_mode(),
            storage: StorageSpec::default(),
            resources: ResourceRequirementsSpec::default(),
            tool_images: ToolImagesSpec::default(),
        }
    }
}

fn default_replicas() -> i32 {
    6
}

fn default_image() -> String {
    "redis:5-alpine".to_string()
}

fn default_cluster_mode() -> bool {
    true
}

/// Persistent storage configuration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Size of the data volume (default: 10Gi).
    #[serde(default = "default_storage_size")]
    pub size: String,

    /// Storage class name for PersistentVolumeClaims.
    /// If not set, pods use an ephemeral emptyDir volume instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            size: default_storage_size(),
            storage_class_name: None,
        }
    }
}

fn default_storage_size() -> String {
    "10Gi".to_string()
}

/// Resource requests and limits for cluster pods.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// CPU and memory requests.
    #[serde(default)]
    pub requests: ResourceSpec,

    /// CPU and memory limits.
    #[serde(default)]
    pub limits: ResourceSpec,
}

/// A cpu/memory quantity pair.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// CPU quantity (default: 100m).
    #[serde(default = "default_cpu")]
    pub cpu: String,

    /// Memory quantity (default: 256Mi).
    #[serde(default = "default_memory")]
    pub memory: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory: default_memory(),
        }
    }
}

fn default_cpu() -> String {
    "100m".to_string()
}

fn default_memory() -> String {
    "256Mi".to_string()
}

/// Images for the transient executor Jobs that drive the cluster-management
/// tool. The bootstrap image initializes a fresh cluster; the scale image
/// performs grow/shrink topology changes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolImagesSpec {
    /// Image used by the cluster-bootstrap Job.
    #[serde(default = "default_bootstrap_image")]
    pub bootstrap: String,

    /// Image used by scale-up/scale-down Jobs.
    #[serde(default = "default_scale_image")]
    pub scale: String,
}

impl Default for ToolImagesSpec {
    fn default() -> Self {
        Self {
            bootstrap: default_bootstrap_image(),
            scale: default_scale_image(),
        }
    }
}

fn default_bootstrap_image() -> String {
    "rediscluster-operator/topology-runner:latest".to_string()
}

fn default_scale_image() -> String {
    "rediscluster-operator/topology-runner:latest".to_string()
}

/// Status of a RedisCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterStatus {
    /// Current phase of the cluster lifecycle.
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Number of ready cluster pods.
    #[serde(default)]
    pub ready_replicas: i32,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// ClusterPhase represents the current lifecycle phase of a RedisCluster.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterPhase {
    /// Initial state, waiting for reconciliation.
    #[default]
    Pending,
    /// Kubernetes resources (StatefulSet, Services) are being created.
    Creating,
    /// Cluster is fully operational.
    Running,
    /// A grow or shrink topology operation is in flight.
    Scaling,
    /// Cluster is operational but degraded (some nodes unavailable).
    Degraded,
    /// Cluster has failed and requires intervention.
    Failed,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Creating => write!(f, "Creating"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Scaling => write!(f, "Scaling"),
            ClusterPhase::Degraded => write!(f, "Degraded"),
            ClusterPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("Progressing", progressing, reason, message, generation)
    }
}

/// Client port served by every cluster node.
pub const CLIENT_PORT: i32 = 6379;

/// Cluster bus port (client port + 10000).
pub const CLUSTER_BUS_PORT: i32 = 16379;

/// The in-cluster DNS name of ordinal pod `i`, derived from the cluster name
/// and namespace. Stable across pod restarts; the discovery and planning code
/// relies on it to correlate ordinal position with live IP.
pub fn node_fqdn(cluster_name: &str, ordinal: i32, namespace: &str) -> String {
    format!(
        "{}-{}.{}-headless.{}.svc.cluster.local",
        cluster_name, ordinal, cluster_name, namespace
    )
}
