//! Transient Job generation for topology operations.
//!
//! Two job shapes are produced:
//! - **Bootstrap job**: created once at cluster-creation time; runs the
//!   topology executor with `OPERATION_TYPE=create` to initialize the cluster
//!   once every node is reachable.
//! - **Scale job**: created per grow/shrink operation; runs the executor with
//!   `OPERATION_TYPE=scale` and the old/new cluster sizes. Names carry a
//!   random suffix so each reconciliation attempt gets a fresh Job.
//!
//! Both are ownership-linked to the RedisCluster and observable through their
//! Job status; the controller never waits on them synchronously.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::RedisCluster;
use crate::resources::common::{owner_reference, random_suffix, standard_labels};

/// Operation type marker understood by the topology executor.
pub const OPERATION_CREATE: &str = "create";
/// Operation type marker understood by the topology executor.
pub const OPERATION_SCALE: &str = "scale";

/// Generate the cluster-bootstrap Job.
pub fn generate_bootstrap_job(resource: &RedisCluster) -> Job {
    let name = resource.name_any();

    let env = vec![
        env_var("OPERATION_TYPE", OPERATION_CREATE),
        env_var("CLUSTER_SIZE", &resource.spec.replicas.to_string()),
        env_var("CLUSTER_NAME", &name),
        env_var("NAMESPACE", &resource.namespace().unwrap_or_default()),
    ];

    generate_job(
        resource,
        name,
        &resource.spec.tool_images.bootstrap,
        env,
        // Bootstrap must eventually succeed; retry in place until it does.
        "OnFailure",
    )
}

/// Generate a scale Job carrying the old and new cluster sizes.
///
/// The returned Job has a unique per-attempt name; callers record it to
/// correlate completion status on later reconciliations.
pub fn generate_scale_job(resource: &RedisCluster, old_count: i32, new_count: i32) -> Job {
    let name = format!("{}-scale-{}", resource.name_any(), random_suffix(8));

    let env = vec![
        env_var("OPERATION_TYPE", OPERATION_SCALE),
        env_var("OLD_CLUSTER_SIZE", &old_count.to_string()),
        env_var("NEW_CLUSTER_SIZE", &new_count.to_string()),
        env_var("CLUSTER_NAME", &resource.name_any()),
        env_var("NAMESPACE", &resource.namespace().unwrap_or_default()),
    ];

    generate_job(
        resource,
        name,
        &resource.spec.tool_images.scale,
        env,
        // A failed scale attempt must surface through Job status, not retry
        // behind the controller's back.
        "Never",
    )
}

fn generate_job(
    resource: &RedisCluster,
    name: String,
    image: &str,
    env: Vec<EnvVar>,
    restart_policy: &str,
) -> Job {
    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(standard_labels(resource)),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    restart_policy: Some(restart_policy.to_string()),
                    containers: vec![Container {
                        name: "topology-runner".to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        command: Some(vec![
                            "/bin/bash".to_string(),
                            "-c".to_string(),
                            "/usr/local/bin/topology-runner && /tmp/cluster-topology.sh"
                                .to_string(),
                        ]),
                        env: Some(env),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Whether a Job has completed successfully, per its status conditions.
pub fn job_succeeded(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.succeeded)
        .unwrap_or(0)
        > 0
}

/// Whether a Job has failed terminally, per its status conditions.
pub fn job_failed(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Failed" && c.status == "True")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

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

    fn env_value(job: &Job, key: &str) -> Option<String> {
        job.spec
            .as_ref()?
            .template
            .spec
            .as_ref()?
            .containers
            .first()?
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == key)?
            .value
            .clone()
    }

    #[test]
    fn test_generate_bootstrap_job() {
        let job = generate_bootstrap_job(&test_resource());

        assert_eq!(job.metadata.name, Some("my-cluster".to_string()));
        assert_eq!(env_value(&job, "OPERATION_TYPE").as_deref(), Some("create"));
        assert_eq!(env_value(&job, "CLUSTER_SIZE").as_deref(), Some("6"));
        assert_eq!(env_value(&job, "CLUSTER_NAME").as_deref(), Some("my-cluster"));
        assert_eq!(env_value(&job, "NAMESPACE").as_deref(), Some("default"));

        let restart = job
            .spec
            .and_then(|s| s.template.spec)
            .and_then(|s| s.restart_policy);
        assert_eq!(restart, Some("OnFailure".to_string()));
    }

    #[test]
    fn test_generate_scale_job() {
        let job = generate_scale_job(&test_resource(), 6, 8);

        let name = job.metadata.name.clone().expect("job name");
        assert!(name.starts_with("my-cluster-scale-"));
        assert_eq!(env_value(&job, "OPERATION_TYPE").as_deref(), Some("scale"));
        assert_eq!(env_value(&job, "OLD_CLUSTER_SIZE").as_deref(), Some("6"));
        assert_eq!(env_value(&job, "NEW_CLUSTER_SIZE").as_deref(), Some("8"));

        let restart = job
            .spec
            .and_then(|s| s.template.spec)
            .and_then(|s| s.restart_policy);
        assert_eq!(restart, Some("Never".to_string()));
    }

    #[test]
    fn test_scale_job_names_are_unique() {
        let a = generate_scale_job(&test_resource(), 6, 8);
        let b = generate_scale_job(&test_resource(), 6, 8);
        assert_ne!(a.metadata.name, b.metadata.name);
    }

    #[test]
    fn test_job_succeeded() {
        let mut job = generate_scale_job(&test_resource(), 8, 6);
        assert!(!job_succeeded(&job));

        job.status = Some(JobStatus {
            succeeded: Some(1),
            ..Default::default()
        });
        assert!(job_succeeded(&job));
    }

    #[test]
    fn test_job_failed() {
        let mut job = generate_scale_job(&test_resource(), 8, 6);
        assert!(!job_failed(&job));

        job.status = Some(JobStatus {
            conditions: Some(vec![JobCondition {
                type_: "Failed".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        assert!(job_failed(&job));
    }
}
