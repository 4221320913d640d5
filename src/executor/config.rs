//! Executor environment configuration.
//!
//! The transient Job pods carry their parameters as environment variables;
//! `ExecutorConfig` deserializes them via `envy`. Missing or inconsistent
//! values are a fatal misconfiguration for that invocation - never retried
//! automatically and never silently defaulted.

use serde::Deserialize;

use super::error::ExecutorError;

/// Operation requested of the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Bootstrap a fresh cluster from all ordinal nodes.
    Create,
    /// Grow or shrink an existing cluster.
    Scale,
}

/// Raw environment contract of the executor image.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    pub operation_type: OperationType,
    pub cluster_name: String,
    pub namespace: String,

    /// Total node count; required for `create`.
    pub cluster_size: Option<i32>,

    /// Node counts before and after the change; required for `scale`.
    pub old_cluster_size: Option<i32>,
    pub new_cluster_size: Option<i32>,
}

impl ExecutorConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ExecutorError> {
        let config: ExecutorConfig = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ExecutorError> {
        if self.cluster_name.is_empty() {
            return Err(ExecutorError::MissingVariable("CLUSTER_NAME".to_string()));
        }
        if self.namespace.is_empty() {
            return Err(ExecutorError::MissingVariable("NAMESPACE".to_string()));
        }

        match self.operation_type {
            OperationType::Create => {
                let size = self
                    .cluster_size
                    .ok_or_else(|| ExecutorError::MissingVariable("CLUSTER_SIZE".to_string()))?;
                if size <= 0 {
                    return Err(ExecutorError::InvalidVariable(format!(
                        "CLUSTER_SIZE must be positive, got {}",
                        size
                    )));
                }
            }
            OperationType::Scale => {
                let old = self.old_cluster_size.ok_or_else(|| {
                    ExecutorError::MissingVariable("OLD_CLUSTER_SIZE".to_string())
                })?;
                let new = self.new_cluster_size.ok_or_else(|| {
                    ExecutorError::MissingVariable("NEW_CLUSTER_SIZE".to_string())
                })?;
                if old <= 0 || new <= 0 {
                    return Err(ExecutorError::InvalidVariable(format!(
                        "cluster sizes must be positive, got old={} new={}",
                        old, new
                    )));
                }
                if old == new {
                    return Err(ExecutorError::InvalidVariable(
                        "OLD_CLUSTER_SIZE and NEW_CLUSTER_SIZE are equal; nothing to do"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(operation: OperationType) -> ExecutorConfig {
        ExecutorConfig {
            operation_type: operation,
            cluster_name: "my-cluster".to_string(),
            namespace: "default".to_string(),
            cluster_size: None,
            old_cluster_size: None,
            new_cluster_size: None,
        }
    }

    #[test]
    fn test_create_requires_cluster_size() {
        let config = base_config(OperationType::Create);
        assert!(matches!(
            config.validate(),
            Err(ExecutorError::MissingVariable(_))
        ));

        let config = ExecutorConfig {
            cluster_size: Some(6),
            ..base_config(OperationType::Create)
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scale_requires_both_sizes() {
        let config = ExecutorConfig {
            old_cluster_size: Some(6),
            ..base_config(OperationType::Scale)
        };
        assert!(matches!(
            config.validate(),
            Err(ExecutorError::MissingVariable(_))
        ));

        let config = ExecutorConfig {
            old_cluster_size: Some(6),
            new_cluster_size: Some(8),
            ..base_config(OperationType::Scale)
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_equal_sizes_rejected() {
        let config = ExecutorConfig {
            old_cluster_size: Some(6),
            new_cluster_size: Some(6),
            ..base_config(OperationType::Scale)
        };
        assert!(matches!(
            config.validate(),
            Err(ExecutorError::InvalidVariable(_))
        ));
    }

    #[test]
    fn test_nonpositive_sizes_rejected() {
        let config = ExecutorConfig {
            cluster_size: Some(0),
            ..base_config(OperationType::Create)
        };
        assert!(matches!(
            config.validate(),
            Err(ExecutorError::InvalidVariable(_))
        ));
    }

    #[test]
    fn test_empty_cluster_name_rejected() {
        let config = ExecutorConfig {
            cluster_name: String::new(),
            cluster_size: Some(6),
            ..base_config(OperationType::Create)
        };
        assert!(matches!(
            config.validate(),
            Err(ExecutorError::MissingVariable(_))
        ));
    }
}
