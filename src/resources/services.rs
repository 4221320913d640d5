//! Service generation for Redis clusters.
//!
//! Creates two services:
//! - **Headless Service**: per-pod DNS records for cluster discovery and
//!   stable ordinal addressing
//! - **Client Service**: load-balanced endpoint for client connections
//!
//! Both are created once at cluster creation and never updated afterwards.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{CLIENT_PORT, CLUSTER_BUS_PORT, RedisCluster};
use crate::resources::common::{
    client_service_name, headless_service_name, owner_reference, pod_selector_labels,
    standard_labels,
};

/// Generate a headless Service for cluster discovery.
///
/// `publishNotReadyAddresses` is required: ordinal DNS names must resolve
/// before the pods pass readiness, otherwise the bootstrap executor can never
/// address the nodes it is supposed to join together.
pub fn generate_headless_service(resource: &RedisCluster) -> Service {
    let name = headless_service_name(resource);
    let mut labels = standard_labels(resource);
    labels.insert(
        "app.kubernetes.io/service-type".to_string(),
        "headless".to_string(),
    );

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(pod_selector_labels(resource)),
            ports: Some(vec![
                ServicePort {
                    port: CLIENT_PORT,
                    target_port: Some(IntOrString::String("redis".to_string())),
                    name: Some("redis".to_string()),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    port: CLUSTER_BUS_PORT,
                    target_port: Some(IntOrString::String("cluster-bus".to_string())),
                    name: Some("cluster-bus".to_string()),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the client-facing Service.
///
/// Only exposes the client port; the cluster bus is internal.
pub fn generate_client_service(resource: &RedisCluster) -> Service {
    let name = client_service_name(resource);
    let mut labels = standard_labels(resource);
    labels.insert(
        "app.kubernetes.io/service-type".to_string(),
        "client".to_string(),
    );

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(pod_selector_labels(resource)),
            ports: Some(vec![ServicePort {
                port: CLIENT_PORT,
                target_port: Some(IntOrString::String("redis".to_string())),
                name: Some("redis".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_resource(name: &str) -> RedisCluster {
        RedisCluster {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    #[test]
    fn test_generate_headless_service() {
        let resource = test_resource("my-cluster");
        let svc = generate_headless_service(&resource);

        assert_eq!(svc.metadata.name, Some("my-cluster-headless".to_string()));
        assert_eq!(svc.metadata.namespace, Some("default".to_string()));

        let spec = svc.spec.expect("service spec");
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));

        let ports = spec.ports.expect("service ports");
        assert_eq!(ports.len(), 2);
        assert!(ports.iter().any(|p| p.port == CLIENT_PORT));
        assert!(ports.iter().any(|p| p.port == CLUSTER_BUS_PORT));
    }

    #[test]
    fn test_generate_client_service() {
        let resource = test_resource("my-cluster");
        let svc = generate_client_service(&resource);

        assert_eq!(svc.metadata.name, Some("my-cluster".to_string()));

        let spec = svc.spec.expect("service spec");
        assert_eq!(spec.type_, Some("ClusterIP".to_string()));

        let ports = spec.ports.expect("service ports");
        assert_eq!(ports.len(), 1);
        assert_eq!(ports.first().map(|p| p.port), Some(CLIENT_PORT));
    }

    #[test]
    fn test_service_type_labels() {
        let resource = test_resource("my-cluster");

        let headless = generate_headless_service(&resource);
        assert_eq!(
            headless
                .metadata
                .labels
                .expect("labels")
                .get("app.kubernetes.io/service-type"),
            Some(&"headless".to_string())
        );

        let client = generate_client_service(&resource);
        assert_eq!(
            client
                .metadata
                .labels
                .expect("labels")
                .get("app.kubernetes.io/service-type"),
            Some(&"client".to_string())
        );
    }
}
