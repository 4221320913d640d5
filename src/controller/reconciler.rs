//! Reconciliation loop for RedisCluster.
//!
//! Each invocation fetches the desired state, compares it with the last
//! successfully applied spec, and decides the operation class: create the
//! cluster, grow it, shrink it, or apply a size-neutral update. Grow and
//! shrink dispatch a transient topology Job; the shrink path waits for its
//! Job cooperatively (requeue and re-check), never by blocking the worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    Api, ResourceExt,
    api::{DeleteParams, Patch, PatchParams, PostParams},
    runtime::controller::Action,
};
use tracing::{debug, error, info, warn};

use crate::{
    controller::{
        context::{Context, FIELD_MANAGER},
        error::Error,
        scale::{PendingScale, ScaleTracker},
    },
    crd::{
        ClusterPhase, Condition, LAST_APPLIED_ANNOTATION, RedisCluster, RedisClusterSpec,
        RedisClusterStatus,
    },
    resources::{configmap, job, services, statefulset},
};

/// Requeue interval while the cluster is stable.
const STABLE_REQUEUE: Duration = Duration::from_secs(300);

/// Requeue interval while a topology operation is converging.
const SCALE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded retry budget for optimistic-concurrency conflicts.
const CONFLICT_RETRIES: u32 = 5;

/// Reconcile a RedisCluster.
pub async fn reconcile(obj: Arc<RedisCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling RedisCluster");

    // Deletion is ownership-driven: owner references cascade to every
    // managed resource, so there is nothing for the controller to do.
    if obj.metadata.deletion_timestamp.is_some() {
        debug!(name = %name, "Resource marked for deletion, skipping");
        return Ok(Action::await_change());
    }

    if let Err(e) = validate_spec(&obj) {
        error!(name = %name, error = %e, "Validation failed");
        ctx.publish_warning_event(&obj, "ValidationFailed", "Validating", Some(e.to_string()))
            .await;
        update_status(&ctx, &obj, &namespace, ClusterPhase::Failed, Some(&e.to_string())).await?;
        return Err(e);
    }

    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let action = match sts_api.get(&name).await {
        Err(kube::Error::Api(e)) if e.code == 404 => {
            reconcile_create(&obj, &ctx, &namespace).await
        }
        Err(e) => Err(Error::Kube(e)),
        Ok(found) => reconcile_existing(&obj, &ctx, &namespace, found).await,
    };

    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
    }

    action
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<RedisCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
        Action::requeue(error.requeue_after())
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
        Action::requeue(error.requeue_after())
    }
}

/// Validate the resource spec
fn validate_spec(obj: &RedisCluster) -> Result<(), Error> {
    let replicas = obj.spec.replicas;
    if replicas < 1 {
        return Err(Error::Validation("replicas must be at least 1".to_string()));
    }
    if obj.spec.cluster_mode_enabled {
        // Three masters with one replica each is the smallest viable cluster.
        if replicas < 6 {
            return Err(Error::Validation(
                "cluster mode requires at least 6 nodes (3 masters with one replica each)"
                    .to_string(),
            ));
        }
        if replicas % 2 != 0 {
            return Err(Error::Validation(
                "cluster mode requires an even node count (one replica per master)".to_string(),
            ));
        }
    }
    if obj.spec.image.is_empty() {
        return Err(Error::Validation("image must not be empty".to_string()));
    }
    Ok(())
}

/// A resource created during this attempt, remembered for rollback.
enum CreatedResource {
    ConfigMap(String),
    Service(String),
    Job(String),
}

/// Creating path: the StatefulSet does not exist yet.
///
/// Dependent resources are created first, the StatefulSet last. Any failure
/// rolls back everything created during this attempt (best-effort,
/// asynchronous) and surfaces the original error for a scheduled retry.
/// LastAppliedSpec is persisted only after everything succeeded.
async fn reconcile_create(
    obj: &RedisCluster,
    ctx: &Context,
    namespace: &str,
) -> Result<Action, Error> {
    let name = obj.name_any();
    info!(name = %name, "Creating cluster resources");

    ctx.publish_normal_event(
        obj,
        "Creating",
        "CreateResources",
        Some("Starting cluster resource creation".to_string()),
    )
    .await;

    let cm_api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    let svc_api: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    let job_api: Api<Job> = Api::namespaced(ctx.client.clone(), namespace);
    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);

    let pp = PostParams::default();
    let mut created: Vec<CreatedResource> = Vec::new();

    let result = async {
        let cm = configmap::generate_configmap(obj);
        cm_api.create(&pp, &cm).await?;
        created.push(CreatedResource::ConfigMap(cm.name_any()));

        let headless = services::generate_headless_service(obj);
        svc_api.create(&pp, &headless).await?;
        created.push(CreatedResource::Service(headless.name_any()));

        let client_svc = services::generate_client_service(obj);
        svc_api.create(&pp, &client_svc).await?;
        created.push(CreatedResource::Service(client_svc.name_any()));

        let bootstrap = job::generate_bootstrap_job(obj);
        job_api.create(&pp, &bootstrap).await?;
        created.push(CreatedResource::Job(bootstrap.name_any()));

        // The workload comes last: once it exists, later reconciliations
        // take the compare path.
        let sts = statefulset::generate_statefulset(obj);
        sts_api.create(&pp, &sts).await?;
        Ok::<(), kube::Error>(())
    }
    .await;

    if let Err(e) = result {
        warn!(name = %name, error = %e, "Cluster creation failed, rolling back partial resources");
        rollback_created(ctx, namespace, created);
        return Err(Error::Kube(e));
    }

    let rc_api: Api<RedisCluster> = Api::namespaced(ctx.client.clone(), namespace);
    persist_last_applied(&rc_api, &name, &obj.spec).await?;
    update_status(ctx, obj, namespace, ClusterPhase::Creating, None).await?;

    info!(name = %name, replicas = obj.spec.replicas, "Cluster resources created");
    Ok(Action::requeue(SCALE_POLL_INTERVAL))
}

/// Best-effort asynchronous deletion of partially created resources.
fn rollback_created(ctx: &Context, namespace: &str, created: Vec<CreatedResource>) {
    let client = ctx.client.clone();
    let namespace = namespace.to_string();
    tokio::spawn(async move {
        let dp = DeleteParams::default();
        for resource in created {
            let result = match &resource {
                CreatedResource::ConfigMap(name) => {
                    Api::<ConfigMap>::namespaced(client.clone(), &namespace)
                        .delete(name, &dp)
                        .await
                        .map(|_| ())
                }
                CreatedResource::Service(name) => {
                    Api::<Service>::namespaced(client.clone(), &namespace)
                        .delete(name, &dp)
                        .await
                        .map(|_| ())
                }
                CreatedResource::Job(name) => {
                    Api::<Job>::namespaced(client.clone(), &namespace)
                        .delete(name, &dp)
                        .await
                        .map(|_| ())
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "Rollback deletion failed");
            }
        }
    });
}

/// Compare path: the StatefulSet exists; diff desired state against the
/// last applied spec and branch on the replica-count change.
async fn reconcile_existing(
    obj: &RedisCluster,
    ctx: &Context,
    namespace: &str,
    found: StatefulSet,
) -> Result<Action, Error> {
    let name = obj.name_any();

    // Absent or malformed content is "no prior applied spec": any non-empty
    // desired count then reads as growth from zero.
    let last_applied = parse_last_applied(obj);
    let old_count = last_applied.as_ref().map(|s| s.replicas).unwrap_or(0);
    let new_count = obj.spec.replicas;

    if last_applied.as_ref() == Some(&obj.spec) {
        debug!(name = %name, "Spec unchanged, nothing to do");
        return Ok(Action::requeue(STABLE_REQUEUE));
    }

    if new_count > old_count {
        reconcile_grow(obj, ctx, namespace, old_count, new_count).await
    } else if new_count < old_count {
        reconcile_shrink(obj, ctx, namespace, old_count, new_count).await
    } else {
        info!(name = %name, "Applying size-neutral spec update");
        apply_statefulset(ctx, namespace, obj, found).await?;

        let rc_api: Api<RedisCluster> = Api::namespaced(ctx.client.clone(), namespace);
        persist_last_applied(&rc_api, &name, &obj.spec).await?;
        update_status(ctx, obj, namespace, ClusterPhase::Running, None).await?;
        Ok(Action::requeue(STABLE_REQUEUE))
    }
}

/// Grow: dispatch the scale-up Job, then bring the workload to the new
/// count. On conflict-retry exhaustion the Job is rolled back so the next
/// attempt starts clean, and LastAppliedSpec stays untouched.
async fn reconcile_grow(
    obj: &RedisCluster,
    ctx: &Context,
    namespace: &str,
    old_count: i32,
    new_count: i32,
) -> Result<Action, Error> {
    let name = obj.name_any();
    info!(name = %name, old_count, new_count, "Growing cluster");

    ctx.publish_normal_event(
        obj,
        "ScalingUp",
        "Scale",
        Some(format!("Scaling from {} to {} nodes", old_count, new_count)),
    )
    .await;

    let job_api: Api<Job> = Api::namespaced(ctx.client.clone(), namespace);
    let scale_job = job::generate_scale_job(obj, old_count, new_count);
    let job_name = scale_job.name_any();
    job_api.create(&PostParams::default(), &scale_job).await?;

    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
    let found = sts_api.get(&name).await?;
    if let Err(e) = apply_statefulset(ctx, namespace, obj, found).await {
        // The executor must not run against a workload that never grew.
        warn!(name = %name, error = %e, "Workload update failed, removing dispatched scale job");
        let job_api = job_api.clone();
        tokio::spawn(async move {
            if let Err(e) = job_api.delete(&job_name, &DeleteParams::default()).await {
                warn!(error = %e, "Scale job rollback deletion failed");
            }
        });
        return Err(e);
    }

    let rc_api: Api<RedisCluster> = Api::namespaced(ctx.client.clone(), namespace);
    persist_last_applied(&rc_api, &name, &obj.spec).await?;
    update_status(ctx, obj, namespace, ClusterPhase::Scaling, None).await?;

    Ok(Action::requeue(SCALE_POLL_INTERVAL))
}

/// Shrink: the scale Job must drain the departing nodes before the workload
/// shrinks, so the reduced StatefulSet is applied only once the Job has
/// succeeded. The wait is cooperative: record the pending Job, requeue, and
/// re-check on re-entry (the owned-Job watch re-triggers reconciliation on
/// completion as well).
async fn reconcile_shrink(
    obj: &RedisCluster,
    ctx: &Context,
    namespace: &str,
    old_count: i32,
    new_count: i32,
) -> Result<Action, Error> {
    let name = obj.name_any();
    let key = ScaleTracker::key(namespace, &name);
    let job_api: Api<Job> = Api::namespaced(ctx.client.clone(), namespace);

    let Some(pending) = ctx.scale_tracker.get(&key).await else {
        info!(name = %name, old_count, new_count, "Shrinking cluster, dispatching drain job");

        ctx.publish_normal_event(
            obj,
            "ScalingDown",
            "Scale",
            Some(format!("Scaling from {} to {} nodes", old_count, new_count)),
        )
        .await;

        let scale_job = job::generate_scale_job(obj, old_count, new_count);
        let job_name = scale_job.name_any();
        job_api.create(&PostParams::default(), &scale_job).await?;

        ctx.scale_tracker
            .record(
                &key,
                PendingScale {
                    job_name,
                    old_count,
                    new_count,
                },
            )
            .await;

        update_status(ctx, obj, namespace, ClusterPhase::Scaling, None).await?;
        return Ok(Action::requeue(SCALE_POLL_INTERVAL));
    };

    match job_api.get(&pending.job_name).await {
        Ok(job) if job::job_succeeded(&job) => {
            info!(name = %name, job = %pending.job_name, "Drain job succeeded, shrinking workload");

            let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
            let found = sts_api.get(&name).await?;
            apply_statefulset(ctx, namespace, obj, found).await?;

            let rc_api: Api<RedisCluster> = Api::namespaced(ctx.client.clone(), namespace);
            persist_last_applied(&rc_api, &name, &obj.spec).await?;
            ctx.scale_tracker.clear(&key).await;

            ctx.publish_normal_event(
                obj,
                "ScaledDown",
                "Scale",
                Some(format!("Cluster shrunk to {} nodes", pending.new_count)),
            )
            .await;
            update_status(ctx, obj, namespace, ClusterPhase::Running, None).await?;
            Ok(Action::requeue(STABLE_REQUEUE))
        }
        Ok(job) if job::job_failed(&job) => {
            ctx.scale_tracker.clear(&key).await;
            ctx.publish_warning_event(
                obj,
                "ScaleJobFailed",
                "Scale",
                Some(format!("Drain job {} failed", pending.job_name)),
            )
            .await;
            Err(Error::ScaleJobFailed(pending.job_name))
        }
        Ok(_) => {
            debug!(name = %name, job = %pending.job_name, "Drain job still running");
            Ok(Action::requeue(SCALE_POLL_INTERVAL))
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            // Someone removed the Job out from under us; start over.
            ctx.scale_tracker.clear(&key).await;
            Err(Error::Transient(format!(
                "scale job {} disappeared before completion",
                pending.job_name
            )))
        }
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Replace the live StatefulSet's spec with the regenerated manifest,
/// retrying on optimistic-concurrency conflicts with a bounded budget.
async fn apply_statefulset(
    ctx: &Context,
    namespace: &str,
    obj: &RedisCluster,
    mut found: StatefulSet,
) -> Result<(), Error> {
    let name = obj.name_any();
    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
    let desired = statefulset::generate_statefulset(obj);

    for attempt in 0..CONFLICT_RETRIES {
        found.spec = desired.spec.clone();
        match sts_api
            .replace(&name, &PostParams::default(), &found)
            .await
        {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(name = %name, attempt, "StatefulSet update conflicted, refetching");
                found = sts_api.get(&name).await?;
            }
            Err(e) => return Err(Error::Kube(e)),
        }
    }

    Err(Error::ConflictRetriesExhausted(
        format!("statefulset/{}", name),
        CONFLICT_RETRIES,
    ))
}

/// Deserialize the last applied spec from the resource annotation.
///
/// Absent, empty, or malformed content yields `None` - the caller treats
/// that as "initial state", never as an error.
pub fn parse_last_applied(obj: &RedisCluster) -> Option<RedisClusterSpec> {
    let raw = obj.annotations().get(LAST_APPLIED_ANNOTATION)?;
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(spec) => Some(spec),
        Err(e) => {
            warn!(error = %e, "Malformed last-applied annotation, treating as initial state");
            None
        }
    }
}

/// Persist the given spec as the last applied one, retrying on
/// optimistic-concurrency conflicts with a bounded budget.
async fn persist_last_applied(
    api: &Api<RedisCluster>,
    name: &str,
    spec: &RedisClusterSpec,
) -> Result<(), Error> {
    let serialized = serde_json::to_string(spec)?;

    for attempt in 0..CONFLICT_RETRIES {
        let mut current = api.get(name).await?;
        current
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(LAST_APPLIED_ANNOTATION.to_string(), serialized.clone());

        match api.replace(name, &PostParams::default(), &current).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(name = %name, attempt, "Annotation update conflicted, refetching");
            }
            Err(e) => return Err(Error::Kube(e)),
        }
    }

    Err(Error::ConflictRetriesExhausted(
        format!("rediscluster/{}", name),
        CONFLICT_RETRIES,
    ))
}

/// Update the status of a RedisCluster
async fn update_status(
    ctx: &Context,
    obj: &RedisCluster,
    namespace: &str,
    phase: ClusterPhase,
    error_message: Option<&str>,
) -> Result<(), Error> {
    let name = obj.name_any();
    let generation = obj.metadata.generation;

    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
    let ready_replicas = match sts_api.get(&name).await {
        Ok(sts) => sts
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0),
        Err(kube::Error::Api(e)) if e.code == 404 => 0,
        Err(e) => return Err(Error::Kube(e)),
    };

    let conditions = match phase {
        ClusterPhase::Running => vec![Condition::ready(
            true,
            "AllReplicasReady",
            "Cluster is running",
            generation,
        )],
        ClusterPhase::Failed => vec![Condition::ready(
            false,
            "ReconciliationFailed",
            error_message.unwrap_or("Cluster failed"),
            generation,
        )],
        _ => vec![Condition::progressing(
            true,
            "Reconciling",
            &format!("Phase: {}", phase),
            generation,
        )],
    };

    let status = RedisClusterStatus {
        phase,
        ready_replicas,
        observed_generation: generation,
        conditions,
    };

    let api: Api<RedisCluster> = Api::namespaced(ctx.client.clone(), namespace);
    api.patch_status(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&serde_json::json!({ "status": status })),
    )
    .await?;

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.set_resource_replicas(
            namespace,
            &name,
            i64::from(obj.spec.replicas),
            i64::from(ready_replicas),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn resource_with_annotation(value: Option<&str>) -> RedisCluster {
        let annotations = value.map(|v| {
            let mut map = BTreeMap::new();
            map.insert(LAST_APPLIED_ANNOTATION.to_string(), v.to_string());
            map
        });
        RedisCluster {
            metadata: ObjectMeta {
                name: Some("my-cluster".to_string()),
                namespace: Some("default".to_string()),
                annotations,
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    #[test]
    fn test_parse_last_applied_roundtrip() {
        let spec = RedisClusterSpec {
            replicas: 8,
            ..Default::default()
        };
        let serialized = serde_json::to_string(&spec).expect("serialize");
        let obj = resource_with_annotation(Some(&serialized));

        let parsed = parse_last_applied(&obj).expect("annotation should parse");
        assert_eq!(parsed.replicas, 8);
    }

    #[test]
    fn test_parse_last_applied_absent() {
        assert!(parse_last_applied(&resource_with_annotation(None)).is_none());
    }

    #[test]
    fn test_parse_last_applied_empty_is_initial_state() {
        // An empty annotation means growth from zero, never a panic.
        let obj = resource_with_annotation(Some(""));
        let last = parse_last_applied(&obj);
        assert!(last.is_none());

        let old_count = last.map(|s| s.replicas).unwrap_or(0);
        assert_eq!(old_count, 0);
        assert!(obj.spec.replicas > old_count);
    }

    #[test]
    fn test_parse_last_applied_malformed_is_initial_state() {
        let obj = resource_with_annotation(Some("{not json"));
        assert!(parse_last_applied(&obj).is_none());
    }

    #[test]
    fn test_validate_spec_cluster_mode_minimum() {
        let mut obj = resource_with_annotation(None);
        obj.spec.replicas = 4;
        assert!(matches!(
            validate_spec(&obj),
            Err(Error::Validation(_))
        ));

        obj.spec.replicas = 6;
        assert!(validate_spec(&obj).is_ok());
    }

    #[test]
    fn test_validate_spec_rejects_odd_cluster_size() {
        let mut obj = resource_with_annotation(None);
        obj.spec.replicas = 7;
        assert!(matches!(
            validate_spec(&obj),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_spec_non_cluster_mode() {
        let mut obj = resource_with_annotation(None);
        obj.spec.cluster_mode_enabled = false;
        obj.spec.replicas = 1;
        assert!(validate_spec(&obj).is_ok());

        obj.spec.replicas = 0;
        assert!(validate_spec(&obj).is_err());
    }

    #[test]
    fn test_unchanged_spec_detected() {
        let spec = RedisClusterSpec::default();
        let serialized = serde_json::to_string(&spec).expect("serialize");
        let obj = resource_with_annotation(Some(&serialized));

        // The compare path treats deep-equality as a no-op.
        assert_eq!(parse_last_applied(&obj).as_ref(), Some(&obj.spec));
    }
}
