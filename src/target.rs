//! Rotation targets and the workloads that depend on them.

use crate::validation::{validate_namespace, validate_resource_name};
use crate::{Config, Result, RotorError, SecretRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Secret holding the database superuser password.
pub const POSTGRES_SECRET: &str = "postgres-secrets";
/// Secret holding the application's environment (DB password, admin login).
pub const APP_SECRET: &str = "n8n-secrets";
/// Secret holding the monitoring dashboard admin login.
pub const GRAFANA_SECRET: &str = "grafana-admin";
/// Secret holding the cloud access key pair.
pub const AWS_SECRET: &str = "aws-credentials";
/// Secret holding generated API tokens.
pub const API_TOKENS_SECRET: &str = "api-tokens";

/// One credential class eligible for rotation.
///
/// The declaration order is the order of a full run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationTarget {
    /// Shared database password (database superuser and application client)
    DatabasePassword,
    /// Application admin login
    AdminPassword,
    /// Monitoring dashboard admin login
    MonitoringPassword,
    /// TLS certificates issued by the in-cluster certificate authority
    TlsCertificates,
    /// Cloud IAM access key pair
    CloudAccessKeys,
    /// Generated API and webhook tokens
    ApiTokens,
}

impl RotationTarget {
    /// All targets in full-run order.
    pub const ALL: [RotationTarget; 6] = [
        Self::DatabasePassword,
        Self::AdminPassword,
        Self::MonitoringPassword,
        Self::TlsCertificates,
        Self::CloudAccessKeys,
        Self::ApiTokens,
    ];

    /// Canonical target name (e.g. "database-password").
    pub fn name(&self) -> &'static str {
        match self {
            Self::DatabasePassword => "database-password",
            Self::AdminPassword => "admin-password",
            Self::MonitoringPassword => "monitoring-password",
            Self::TlsCertificates => "tls-certificates",
            Self::CloudAccessKeys => "cloud-access-keys",
            Self::ApiTokens => "api-tokens",
        }
    }

    /// Short command name used on the command line (e.g. "postgres").
    pub fn command(&self) -> &'static str {
        match self {
            Self::DatabasePassword => "postgres",
            Self::AdminPassword => "n8n",
            Self::MonitoringPassword => "grafana",
            Self::TlsCertificates => "ssl",
            Self::CloudAccessKeys => "aws",
            Self::ApiTokens => "api",
        }
    }

    /// Secret objects this target writes, which the backup writer captures.
    pub fn backup_secrets(&self, config: &Config) -> Result<Vec<SecretRef>> {
        let ns = config.namespace.as_str();
        Ok(match self {
            Self::DatabasePassword => vec![
                SecretRef::new(ns, POSTGRES_SECRET)?,
                SecretRef::new(ns, APP_SECRET)?,
            ],
            Self::AdminPassword => vec![SecretRef::new(ns, APP_SECRET)?],
            Self::MonitoringPassword => {
                vec![SecretRef::new(&config.monitoring_namespace, GRAFANA_SECRET)?]
            }
            Self::TlsCertificates => Vec::new(),
            Self::CloudAccessKeys => vec![SecretRef::new(ns, AWS_SECRET)?],
            Self::ApiTokens => vec![SecretRef::new(ns, API_TOKENS_SECRET)?],
        })
    }

    /// Workloads to restart after mutation, in restart order.
    pub fn dependent_services(&self, config: &Config) -> Result<Vec<Workload>> {
        let ns = config.namespace.as_str();
        let app = || Workload::deployment(ns, "n8n", config.application_timeout);
        Ok(match self {
            Self::DatabasePassword => vec![
                Workload::stateful_set(ns, "postgres", config.stateful_timeout)?,
                app()?,
            ],
            Self::AdminPassword | Self::CloudAccessKeys | Self::ApiTokens => vec![app()?],
            Self::MonitoringPassword => vec![Workload::deployment(
                &config.monitoring_namespace,
                "grafana",
                config.stateful_timeout,
            )?],
            Self::TlsCertificates => Vec::new(),
        })
    }

    /// Dependent workloads of `targets`, deduplicated in the order given.
    pub fn dependent_services_of(targets: &[RotationTarget], config: &Config) -> Result<Vec<Workload>> {
        let mut out: Vec<Workload> = Vec::new();
        for target in targets {
            for workload in target.dependent_services(config)? {
                if !out.iter().any(|w| w.same_object(&workload)) {
                    out.push(workload);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for RotationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RotationTarget {
    type Err = RotorError;

    /// Accepts either the canonical name or the command name.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s || t.command() == s)
            .ok_or_else(|| RotorError::InvalidName(format!("unknown rotation target: {}", s)))
    }
}

/// Kind of restartable workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    /// Stateless deployment
    Deployment,
    /// Stateful set (databases, caches)
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::StatefulSet => write!(f, "statefulset"),
        }
    }
}

/// A dependent service that must restart to pick up a rotated credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Workload kind
    pub kind: WorkloadKind,
    /// Namespace
    pub namespace: String,
    /// Workload name
    pub name: String,
    /// How long to wait for readiness after a restart
    pub timeout: Duration,
}

impl Workload {
    /// Creates a validated deployment reference.
    pub fn deployment(namespace: &str, name: &str, timeout: Duration) -> Result<Self> {
        Self::new(WorkloadKind::Deployment, namespace, name, timeout)
    }

    /// Creates a validated stateful set reference.
    pub fn stateful_set(namespace: &str, name: &str, timeout: Duration) -> Result<Self> {
        Self::new(WorkloadKind::StatefulSet, namespace, name, timeout)
    }

    fn new(kind: WorkloadKind, namespace: &str, name: &str, timeout: Duration) -> Result<Self> {
        validate_namespace(namespace)?;
        validate_resource_name(name)?;
        Ok(Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            timeout,
        })
    }

    /// `kind/name` form understood by `kubectl rollout`.
    pub fn resource(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    /// True when both refer to the same object, regardless of timeout.
    pub fn same_object(&self, other: &Workload) -> bool {
        self.kind == other.kind && self.namespace == other.namespace && self.name == other.name
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// A certificate managed by the in-cluster certificate authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Namespace
    pub namespace: String,
    /// Certificate resource name
    pub name: String,
    /// Name of the TLS secret the authority writes
    pub secret_name: String,
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/certificate/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_names_round_trip() {
        for target in RotationTarget::ALL {
            assert_eq!(target.name().parse::<RotationTarget>().unwrap(), target);
            assert_eq!(target.command().parse::<RotationTarget>().unwrap(), target);
        }
        assert!("mysql".parse::<RotationTarget>().is_err());
    }

    #[test]
    fn test_database_dependents_and_timeouts() {
        let config = Config::default();
        let deps = RotationTarget::DatabasePassword
            .dependent_services(&config)
            .unwrap();

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].resource(), "statefulset/postgres");
        assert_eq!(deps[0].timeout, Duration::from_secs(300));
        assert_eq!(deps[1].resource(), "deployment/n8n");
        assert_eq!(deps[1].timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_tls_has_no_dependents_or_backups() {
        let config = Config::default();
        assert!(RotationTarget::TlsCertificates
            .dependent_services(&config)
            .unwrap()
            .is_empty());
        assert!(RotationTarget::TlsCertificates
            .backup_secrets(&config)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_dependent_services_of_deduplicated() {
        let config = Config::default();
        let deps = RotationTarget::dependent_services_of(&RotationTarget::ALL, &config).unwrap();
        let names: Vec<String> = deps.iter().map(|w| w.to_string()).collect();

        assert_eq!(
            names,
            vec![
                "n8n/statefulset/postgres",
                "n8n/deployment/n8n",
                "monitoring/deployment/grafana",
            ]
        );

        let deps =
            RotationTarget::dependent_services_of(&[RotationTarget::MonitoringPassword], &config)
                .unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].to_string(), "monitoring/deployment/grafana");
    }

    #[test]
    fn test_workload_rejects_dotted_namespace() {
        assert!(Workload::deployment("a.b", "n8n", Duration::from_secs(1)).is_err());
        assert!(Workload::deployment("a", "n8n", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&RotationTarget::CloudAccessKeys).unwrap();
        assert_eq!(json, "\"cloud-access-keys\"");
    }
}
