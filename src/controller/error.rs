//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// A scale Job reached a terminal failure state
    #[error("Scale job {0} failed; inspect its pod logs")]
    ScaleJobFailed(String),

    /// Optimistic-concurrency retries exhausted
    #[error("Update of {0} kept conflicting after {1} attempts")]
    ConflictRetriesExhausted(String, u32),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error indicates an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on rate limiting, server errors, and conflicts
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Transient(_) | Error::ConflictRetriesExhausted(..) => true,
            // A failed scale job stays failed until a new reconciliation
            // creates a fresh one; retrying on a timer is still correct.
            Error::ScaleJobFailed(_) => true,
            Error::Validation(_) => false,
            Error::Serialization(_) => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(3600)
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
