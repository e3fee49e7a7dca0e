//! Backend selection and wiring.
//!
//! The orchestrator works against a [`Backends`] bundle: one secret store,
//! one platform and one cloud IAM implementation. [`new_backends`] builds the
//! bundle for a [`BackendKind`].

use crate::backends::aws::AwsIamBackend;
use crate::backends::kubectl::KubectlBackend;
use crate::{CloudIam, Platform, Result, RotorError, SecretStore};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which backend family drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `kubectl` for secrets and workloads, `aws` CLI for IAM keys
    Kubectl,
    /// In-memory cluster (dry runs and tests)
    #[cfg(feature = "mock")]
    Mock,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kubectl => write!(f, "kubectl"),
            #[cfg(feature = "mock")]
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = RotorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kubectl" | "kubernetes" | "k8s" => Ok(Self::Kubectl),
            #[cfg(feature = "mock")]
            "mock" => Ok(Self::Mock),
            other => Err(RotorError::Other(anyhow::anyhow!(
                "unknown backend: {} (did you enable the '{}' feature flag?)",
                other,
                other
            ))),
        }
    }
}

/// Options forwarded to the CLI-driven backends.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// kubeconfig context to use instead of the current one
    pub kube_context: Option<String>,
    /// AWS CLI profile to use instead of the default chain
    pub aws_profile: Option<String>,
}

/// The three external seams a run is wired to.
#[derive(Clone)]
pub struct Backends {
    /// Secret storage
    pub store: Arc<dyn SecretStore>,
    /// Workload lifecycle and cluster health
    pub platform: Arc<dyn Platform>,
    /// Cloud access key management
    pub iam: Arc<dyn CloudIam>,
}

impl Backends {
    /// Bundles explicit implementations.
    pub fn new(
        store: Arc<dyn SecretStore>,
        platform: Arc<dyn Platform>,
        iam: Arc<dyn CloudIam>,
    ) -> Self {
        Self {
            store,
            platform,
            iam,
        }
    }

    /// Wires every seam to the same in-memory cluster.
    #[cfg(feature = "mock")]
    pub fn mock(cluster: Arc<crate::backends::mock::MockCluster>) -> Self {
        Self {
            store: cluster.clone(),
            platform: cluster.clone(),
            iam: cluster,
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("store", &self.store.name())
            .field("platform", &self.platform.name())
            .field("iam", &self.iam.name())
            .finish()
    }
}

/// Creates the backend bundle for `kind`.
///
/// # Example
///
/// ```
/// use keyrotor::factory::{new_backends, BackendKind, BackendOptions};
///
/// let backends = new_backends(BackendKind::Kubectl, &BackendOptions::default());
/// assert_eq!(backends.store.name(), "kubectl");
/// assert_eq!(backends.iam.name(), "aws");
/// ```
pub fn new_backends(kind: BackendKind, options: &BackendOptions) -> Backends {
    match kind {
        BackendKind::Kubectl => {
            let mut kubectl = KubectlBackend::new();
            if let Some(ref context) = options.kube_context {
                kubectl = kubectl.with_context(context.clone());
            }
            let kubectl = Arc::new(kubectl);

            let mut aws = AwsIamBackend::new();
            if let Some(ref profile) = options.aws_profile {
                aws = aws.with_profile(profile.clone());
            }

            Backends::new(kubectl.clone(), kubectl, Arc::new(aws))
        }
        #[cfg(feature = "mock")]
        BackendKind::Mock => Backends::mock(Arc::new(crate::backends::mock::MockCluster::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("kubectl".parse::<BackendKind>().unwrap(), BackendKind::Kubectl);
        assert_eq!("K8S".parse::<BackendKind>().unwrap(), BackendKind::Kubectl);
        assert_eq!(BackendKind::Kubectl.to_string(), "kubectl");
    }

    #[test]
    fn test_unknown_backend_error() {
        let err = "vault".parse::<BackendKind>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown backend"));
        assert!(msg.contains("feature flag"));
    }

    #[test]
    #[cfg(feature = "mock")]
    fn test_mock_backends() {
        let backends = new_backends(BackendKind::Mock, &BackendOptions::default());
        assert_eq!(backends.store.name(), "mock");
        assert_eq!(backends.platform.name(), "mock");
        assert!(format!("{:?}", backends).contains("mock"));
    }
}
