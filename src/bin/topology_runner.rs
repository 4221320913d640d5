//! topology-runner - the transient executor for cluster topology operations.
//!
//! Runs inside the bootstrap/scale Job pods. Reads its contract from the
//! environment, gates on node readiness, and writes the automation script
//! that the Job's shell executes next. Failures surface through the exit
//! status, which the controller observes via the Job resource.

use tracing::{error, info};

use rediscluster_operator::executor::{ExecutorConfig, runner};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match ExecutorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Misconfiguration is fatal to this invocation; there is nothing
            // to retry until the Job is recreated with a sane environment.
            error!(error = %e, "Executor environment misconfigured");
            std::process::exit(1);
        }
    };

    info!(
        cluster = %config.cluster_name,
        namespace = %config.namespace,
        operation = ?config.operation_type,
        "Starting topology executor"
    );

    if let Err(e) = runner::run(&config).await {
        error!(error = %e, "Topology executor failed");
        std::process::exit(1);
    }
}
