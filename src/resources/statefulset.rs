//! StatefulSet generation for Redis clusters.
//!
//! The StatefulSet provides stable ordinal identity (pod-0, pod-1, ...) via
//! the headless service, the mounted cluster configuration, and persistent
//! storage when a storage class is configured.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    KeyToPath, ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, ResourceRequirements, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::crd::{CLIENT_PORT, CLUSTER_BUS_PORT, RedisCluster};
use crate::resources::common::{
    headless_service_name, owner_reference, pod_selector_labels, standard_labels,
};
use crate::resources::configmap::REDIS_CONFIG_KEY;

const DATA_VOLUME: &str = "redis-data";
const CONFIG_VOLUME: &str = "redis-conf";
const CONFIG_MOUNT_PATH: &str = "/etc/redis";
const DATA_MOUNT_PATH: &str = "/data";

/// Generate a StatefulSet for a RedisCluster.
///
/// The replica count tracks the desired cluster size directly; grow and
/// shrink reconciliations regenerate this manifest at the new count and
/// replace the live object's spec.
pub fn generate_statefulset(resource: &RedisCluster) -> StatefulSet {
    let name = resource.name_any();
    let labels = standard_labels(resource);

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(resource.spec.replicas),
            service_name: Some(headless_service_name(resource)),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(resource)),
                ..Default::default()
            },
            template: generate_pod_template(resource, &labels),
            volume_claim_templates: resource
                .spec
                .storage
                .storage_class_name
                .as_ref()
                .map(|_| vec![generate_pvc_template(resource)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_pod_template(
    resource: &RedisCluster,
    labels: &BTreeMap<String, String>,
) -> PodTemplateSpec {
    // Without a storage class the data volume is an ephemeral emptyDir;
    // with one it comes from the PVC template instead.
    let mut volumes = vec![Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: resource.name_any(),
            items: Some(vec![KeyToPath {
                key: REDIS_CONFIG_KEY.to_string(),
                path: REDIS_CONFIG_KEY.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }];
    if resource.spec.storage.storage_class_name.is_none() {
        volumes.push(Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![generate_container(resource)],
            volumes: Some(volumes),
            ..Default::default()
        }),
    }
}

fn generate_container(resource: &RedisCluster) -> Container {
    let mut command = vec![
        "redis-server".to_string(),
        format!("{}/{}", CONFIG_MOUNT_PATH, REDIS_CONFIG_KEY),
    ];
    if !resource.spec.cluster_mode_enabled {
        // Single-instance mode still mounts the config but disables the
        // cluster section at the command line.
        command.push("--cluster-enabled no".to_string());
    }

    Container {
        name: "redis".to_string(),
        image: Some(resource.spec.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(command),
        ports: Some(vec![
            ContainerPort {
                name: Some("redis".to_string()),
                container_port: CLIENT_PORT,
                ..Default::default()
            },
            ContainerPort {
                name: Some("cluster-bus".to_string()),
                container_port: CLUSTER_BUS_PORT,
                ..Default::default()
            },
        ]),
        env: Some(vec![EnvVar {
            name: "POD_IP".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "status.podIP".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        resources: Some(generate_resource_requirements(resource)),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

fn generate_resource_requirements(resource: &RedisCluster) -> ResourceRequirements {
    let requests = &resource.spec.resources.requests;
    let limits = &resource.spec.resources.limits;

    let quantities = |cpu: &str, memory: &str| {
        let mut map = BTreeMap::new();
        map.insert("cpu".to_string(), Quantity(cpu.to_string()));
        map.insert("memory".to_string(), Quantity(memory.to_string()));
        map
    };

    ResourceRequirements {
        requests: Some(quantities(&requests.cpu, &requests.memory)),
        limits: Some(quantities(&limits.cpu, &limits.memory)),
        ..Default::default()
    }
}

fn generate_pvc_template(resource: &RedisCluster) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    requests.insert(
        "storage".to_string(),
        Quantity(resource.spec.storage.size.clone()),
    );

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: resource.spec.storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
