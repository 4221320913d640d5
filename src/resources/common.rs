//! Common resource generation utilities.
//!
//! Provides labels, naming helpers, and owner references shared by all
//! manifest builders.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use rand::Rng;

use crate::crd::RedisCluster;

/// Standard labels applied to all managed resources.
pub fn standard_labels(resource: &RedisCluster) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), resource.name_any());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "rediscluster-operator".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "rediscluster".to_string(),
    );
    labels
}

/// Selector labels shared by the StatefulSet pod template and both Services.
pub fn pod_selector_labels(resource: &RedisCluster) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), resource.name_any());
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "rediscluster".to_string(),
    );
    labels
}

/// Name of the headless Service providing per-pod DNS records.
pub fn headless_service_name(resource: &RedisCluster) -> String {
    format!("{}-headless", resource.name_any())
}

/// Name of the client-facing Service.
pub fn client_service_name(resource: &RedisCluster) -> String {
    resource.name_any()
}

/// Create the controller owner reference linking a managed resource to its
/// RedisCluster, so that deleting the RedisCluster cascades.
pub fn owner_reference(resource: &RedisCluster) -> OwnerReference {
    OwnerReference {
        api_version: "rediscluster.k8s.io/v1alpha1".to_string(),
        kind: "RedisCluster".to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate a short lowercase alphanumeric suffix for per-attempt resource
/// names (scale Jobs). Uniqueness per reconciliation attempt is what matters;
/// determinism is not required.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            char::from_digit(idx, 36).unwrap_or('x')
        })
        .collect()
}
