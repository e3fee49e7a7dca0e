//! Post-rotation verification.
//!
//! Two kinds of probe run exactly once each: pod health in every watched
//! namespace and an HTTP GET against each configured health endpoint. Any
//! failing probe fails the report; nothing is retried.

use crate::{Config, Platform, Result, RotorError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for health endpoint probes.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// True when no probe failed
    pub passed: bool,

    /// Human-readable description of every failing probe
    pub failures: Vec<String>,
}

impl VerificationReport {
    fn from_failures(failures: Vec<String>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }
}

/// Runs the verification probes.
pub struct Verifier {
    platform: Arc<dyn Platform>,
    client: reqwest::Client,
    namespaces: Vec<String>,
    endpoints: Vec<String>,
}

impl Verifier {
    /// Creates a verifier watching the application and monitoring namespaces
    /// and probing the configured health endpoints.
    pub fn new(platform: Arc<dyn Platform>, config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HEALTH_PROBE_TIMEOUT)
            .build()?;

        let mut namespaces = vec![config.namespace.clone()];
        if config.monitoring_namespace != config.namespace {
            namespaces.push(config.monitoring_namespace.clone());
        }

        Ok(Self {
            platform,
            client,
            namespaces,
            endpoints: config.health_endpoints.clone(),
        })
    }

    /// Runs every probe once and collects the failures.
    pub async fn verify(&self) -> VerificationReport {
        let mut failures = Vec::new();

        for namespace in &self.namespaces {
            match self.platform.unready_pods(namespace).await {
                Ok(pods) if pods.is_empty() => {
                    tracing::info!(namespace = %namespace, "all pods running");
                }
                Ok(pods) => {
                    tracing::warn!(namespace = %namespace, pods = ?pods, "pods not running");
                    failures.push(format!(
                        "{}: pods not running: {}",
                        namespace,
                        pods.join(", ")
                    ));
                }
                Err(e) => {
                    tracing::warn!(namespace = %namespace, error = %e, "pod health check failed");
                    failures.push(format!("{}: pod health check failed: {}", namespace, e));
                }
            }
        }

        for endpoint in &self.endpoints {
            match self.probe(endpoint).await {
                Ok(()) => tracing::info!(endpoint = %endpoint, "health endpoint ok"),
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "health endpoint failed");
                    failures.push(format!("{}: {}", endpoint, e));
                }
            }
        }

        let report = VerificationReport::from_failures(failures);
        if report.passed {
            tracing::info!("verification passed");
        } else {
            tracing::error!(failures = report.failures.len(), "verification failed");
        }
        report
    }

    async fn probe(&self, endpoint: &str) -> Result<()> {
        let response = self.client.get(endpoint).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RotorError::CommandFailed(format!("HTTP {}", status)))
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backends::mock::MockCluster;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_verify_passes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = Config::default().with_health_endpoint(format!("{}/healthz", mock_server.uri()));
        let verifier = Verifier::new(Arc::new(MockCluster::new()), &config).unwrap();

        let report = verifier.verify().await;
        assert!(report.passed);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_verify_reports_unhealthy_endpoint() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = Config::default().with_health_endpoint(format!("{}/healthz", mock_server.uri()));
        let verifier = Verifier::new(Arc::new(MockCluster::new()), &config).unwrap();

        let report = verifier.verify().await;
        assert!(!report.passed);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("503"));
    }

    #[tokio::test]
    async fn test_verify_reports_unready_pods() {
        let cluster = MockCluster::new();
        cluster
            .set_unready_pods("monitoring", vec!["grafana-7d9f-x2".to_string()])
            .await;

        let verifier = Verifier::new(Arc::new(cluster), &Config::default()).unwrap();
        let report = verifier.verify().await;

        assert!(!report.passed);
        assert_eq!(
            report.failures,
            vec!["monitoring: pods not running: grafana-7d9f-x2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_verify_unreachable_endpoint() {
        let config = Config::default().with_health_endpoint("http://127.0.0.1:9/healthz");
        let verifier = Verifier::new(Arc::new(MockCluster::new()), &config).unwrap();

        let report = verifier.verify().await;
        assert!(!report.passed);
    }
}
