//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler:
//! the Kubernetes client, the event recorder, the per-resource scale
//! tracker, and the optional health state for metrics.

use std::sync::Arc;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use crate::controller::scale::ScaleTracker;
use crate::crd::RedisCluster;
use crate::health::HealthState;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "rediscluster-operator";

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client; safe for concurrent use across resource keys.
    pub client: Client,
    /// Event reporter identity
    reporter: Reporter,
    /// In-flight scale-down state, keyed per resource.
    pub scale_tracker: ScaleTracker,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            scale_tracker: ScaleTracker::new(),
            health_state,
        }
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    /// Publish a normal event for a resource
    pub async fn publish_normal_event(
        &self,
        resource: &RedisCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event(
        &self,
        resource: &RedisCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Warning, reason, action, note)
            .await;
    }

    async fn publish(
        &self,
        resource: &RedisCluster,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = self.recorder();
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }
}
