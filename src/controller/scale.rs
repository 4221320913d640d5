//! Per-resource tracking of in-flight scale-down operations.
//!
//! A shrink dispatches a scale Job and then waits for it across
//! reconciliations (cooperative requeue, never a blocking sleep). The wait
//! state is keyed by resource so that concurrent shrinks of different
//! clusters never observe each other; one shrink per cluster is in flight at
//! a time.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// A dispatched scale-down awaiting completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingScale {
    /// Name of the scale Job to watch.
    pub job_name: String,
    /// Cluster size before the operation.
    pub old_count: i32,
    /// Cluster size the operation converges to.
    pub new_count: i32,
}

/// Keyed map of in-flight scale-downs, shared through the controller
/// context. Keys are `namespace/name`.
#[derive(Debug, Default)]
pub struct ScaleTracker {
    inner: RwLock<HashMap<String, PendingScale>>,
}

impl ScaleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the tracker key for a resource.
    pub fn key(namespace: &str, name: &str) -> String {
        format!("{}/{}", namespace, name)
    }

    /// The pending operation for a resource, if one is in flight.
    pub async fn get(&self, key: &str) -> Option<PendingScale> {
        self.inner.read().await.get(key).cloned()
    }

    /// Record a newly dispatched operation.
    pub async fn record(&self, key: &str, pending: PendingScale) {
        self.inner.write().await.insert(key.to_string(), pending);
    }

    /// Clear a completed or abandoned operation.
    pub async fn clear(&self, key: &str) {
        self.inner.write().await.remove(key);
    }
}
