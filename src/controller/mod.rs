//! Controller module for rediscluster-operator.
//!
//! Contains the reconciliation loop, shared context, error taxonomy, and the
//! per-resource scale tracking that serializes shrink operations.

pub mod context;
pub mod error;
pub mod reconciler;
pub mod scale;

pub use context::Context;
pub use error::Error;
