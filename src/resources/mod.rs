//! Resource generation module.
//!
//! Pure `spec -> manifest` builders for the Kubernetes resources owned by a
//! RedisCluster.
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | StatefulSet | Stable ordinal identity for cluster nodes |
//! | Headless Service | Per-pod DNS for discovery and ordinal addressing |
//! | Client Service | Client access endpoint |
//! | ConfigMap | redis.conf and the pod-IP fixup hook |
//! | Job | Transient topology executors (bootstrap / scale) |

pub mod common;
pub mod configmap;
pub mod job;
pub mod services;
pub mod statefulset;

pub use common::{owner_reference, standard_labels};
