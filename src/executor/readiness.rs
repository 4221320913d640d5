//! Readiness gate for cluster nodes.
//!
//! Before any topology mutation, every expected ordinal node must be
//! network-reachable: shard and membership commands against a node that is
//! not yet listening fail non-idempotently. The gate resolves each ordinal
//! address and attempts a TCP connection to the client port, repeating until
//! all expected nodes answer or the timeout policy aborts.

use std::collections::HashSet;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::crd::{CLIENT_PORT, node_fqdn};

/// Timeout policy for the readiness gate.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// Overall deadline for the whole gate.
    pub deadline: Duration,
    /// Pause between poll rounds.
    pub poll_interval: Duration,
    /// Per-connection attempt timeout.
    pub connect_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Gate over the expected ordinal nodes of one cluster.
pub struct ReadinessGate {
    cluster_name: String,
    namespace: String,
    expected: i32,
    policy: TimeoutPolicy,
}

impl ReadinessGate {
    pub fn new(cluster_name: &str, namespace: &str, expected: i32, policy: TimeoutPolicy) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            namespace: namespace.to_string(),
            expected,
            policy,
        }
    }

    /// Wait until every expected node accepts a connection.
    ///
    /// Returns `true` once all nodes answered, `false` if the deadline
    /// elapsed first. Resolution failures count as "not ready", not as
    /// errors.
    pub async fn wait_ready(&self) -> bool {
        let start = tokio::time::Instant::now();
        let mut ready: HashSet<i32> = HashSet::new();

        loop {
            for ordinal in 0..self.expected {
                if ready.contains(&ordinal) {
                    continue;
                }
                let fqdn = node_fqdn(&self.cluster_name, ordinal, &self.namespace);
                if self.probe(&fqdn).await {
                    ready.insert(ordinal);
                    debug!(node = %fqdn, ready = ready.len(), expected = self.expected, "Node ready");
                }
            }

            if ready.len() == self.expected as usize {
                info!(
                    cluster = %self.cluster_name,
                    nodes = self.expected,
                    "All cluster nodes reachable"
                );
                return true;
            }

            if start.elapsed() >= self.policy.deadline {
                info!(
                    cluster = %self.cluster_name,
                    ready = ready.len(),
                    expected = self.expected,
                    "Readiness deadline elapsed"
                );
                return false;
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    /// Attempt one TCP connection to a node's client port.
    async fn probe(&self, host: &str) -> bool {
        probe_addr(
            &format!("{}:{}", host, CLIENT_PORT),
            self.policy.connect_timeout,
        )
        .await
    }
}

/// Attempt one TCP connection to `addr` within `timeout`.
async fn probe_addr(addr: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Resolve a node's FQDN to its live IP.
///
/// Returns `None` when the name does not (yet) resolve; callers treat that
/// as "not ready" rather than an error.
pub async fn resolve_node_ip(fqdn: &str) -> Option<String> {
    let addrs = tokio::net::lookup_host((fqdn, CLIENT_PORT as u16)).await.ok()?;
    addrs.into_iter().next().map(|a| a.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_gate_times_out_when_nothing_listens() {
        let policy = TimeoutPolicy {
            deadline: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(20),
        };
        let gate = ReadinessGate::new("no-such-cluster", "default", 1, policy);
        assert!(!gate.wait_ready().await);
    }

    #[tokio::test]
    async fn test_probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();

        assert!(probe_addr(&addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_probe_fails_without_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        assert!(!probe_addr(&addr, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_resolve_unknown_name_is_none() {
        assert!(
            resolve_node_ip("no-such-host.invalid.svc.cluster.local")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let ip = resolve_node_ip("localhost").await;
        assert!(ip.is_some());
    }
}
