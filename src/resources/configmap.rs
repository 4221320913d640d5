//! ConfigMap generation for Redis clusters.
//!
//! The ConfigMap carries the redis.conf used by every cluster pod and the
//! fix-ip.sh entrypoint hook that rewrites the pod's own address in
//! nodes.conf after a restart (pod IPs are not stable across restarts, node
//! IDs are).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::RedisCluster;
use crate::resources::common::{owner_reference, standard_labels};

/// Key of the redis configuration file within the ConfigMap.
pub const REDIS_CONFIG_KEY: &str = "redis.conf";

/// Key of the IP-fixup entrypoint hook within the ConfigMap.
pub const FIX_IP_KEY: &str = "fix-ip.sh";

const REDIS_CONFIG: &str = "\
cluster-enabled yes
cluster-config-file /data/nodes.conf
cluster-node-timeout 5000
cluster-migration-barrier 1
dir /data
appendonly yes
protected-mode no
";

const FIX_IP_SCRIPT: &str = r#"#!/bin/sh
CLUSTER_CONFIG="/data/nodes.conf"
if [ -f ${CLUSTER_CONFIG} ]; then
  if [ -z "${POD_IP}" ]; then
    echo "Unable to determine Pod IP address!"
    exit 1
  fi
  echo "Updating my IP to ${POD_IP} in ${CLUSTER_CONFIG}"
  sed -i.bak -e '/myself/ s/[0-9]\{1,3\}\.[0-9]\{1,3\}\.[0-9]\{1,3\}\.[0-9]\{1,3\}/'${POD_IP}'/' ${CLUSTER_CONFIG}
fi
exec "$@"
"#;

/// Generate the ConfigMap for a RedisCluster.
pub fn generate_configmap(resource: &RedisCluster) -> ConfigMap {
    let name = resource.name_any();
    let labels = standard_labels(resource);

    let mut data = BTreeMap::new();
    data.insert(REDIS_CONFIG_KEY.to_string(), REDIS_CONFIG.to_string());
    data.insert(FIX_IP_KEY.to_string(), FIX_IP_SCRIPT.to_string());

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_resource() -> RedisCluster {
        RedisCluster {
            metadata: ObjectMeta {
                name: Some("my-cluster".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    #[test]
    fn test_generate_configmap() {
        let cm = generate_configmap(&test_resource());

        assert_eq!(cm.metadata.name, Some("my-cluster".to_string()));
        assert_eq!(cm.metadata.namespace, Some("default".to_string()));
        assert!(cm.metadata.owner_references.is_some());

        let data = cm.data.expect("configmap should carry data");
        let conf = data.get(REDIS_CONFIG_KEY).expect("redis.conf present");
        assert!(conf.contains("cluster-enabled yes"));
        assert!(conf.contains("appendonly yes"));

        let fixup = data.get(FIX_IP_KEY).expect("fix-ip.sh present");
        assert!(fixup.contains("nodes.conf"));
        assert!(fixup.contains("POD_IP"));
    }
}
