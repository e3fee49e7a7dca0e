//! Mock cluster for testing.
//!
//! [`MockCluster`] implements [`SecretStore`], [`Platform`] and [`CloudIam`]
//! entirely in memory, with error injection and scripted readiness so that
//! orchestration logic can be exercised without a cluster.

use crate::*;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

/// Serialized form of a mock secret, as produced by `export`.
#[derive(Debug, Serialize, Deserialize)]
struct MockSecretDocument {
    kind: String,
    namespace: String,
    name: String,
    data: BTreeMap<String, String>,
}

/// In-memory cluster for testing.
///
/// # Example
///
/// ```
/// use keyrotor::backends::mock::MockCluster;
/// use keyrotor::{SecretRef, SecretStore};
///
/// #[tokio::main]
/// async fn main() -> keyrotor::Result<()> {
///     let cluster = MockCluster::new();
///     let secret = SecretRef::new("n8n", "postgres-secrets")?;
///     cluster.set_secret(&secret, [("POSTGRES_PASSWORD", "old")]).await;
///
///     assert_eq!(cluster.read_field(&secret, "POSTGRES_PASSWORD").await?, "old");
///     Ok(())
/// }
/// ```
pub struct MockCluster {
    secrets: RwLock<BTreeMap<SecretRef, BTreeMap<String, String>>>,
    restarts: RwLock<Vec<String>>,
    pending_polls: RwLock<HashMap<String, u32>>,
    stuck: RwLock<HashSet<String>>,
    unready_pods: RwLock<HashMap<String, Vec<String>>>,
    certificates: RwLock<Vec<Certificate>>,
    renewed: RwLock<Vec<String>>,
    iam_user: RwLock<Option<String>>,
    iam_keys: RwLock<Vec<String>>,
    key_counter: RwLock<u32>,

    /// Whether a certificate issuer is installed
    pub issuer_installed: bool,
    /// Polls a workload stays unready after each restart
    pub ready_after_polls: u32,
    /// Error to return from `preflight()`
    pub preflight_error: Option<RotorError>,
    /// Error to return from `patch_fields()`, `apply()` and `restore()`
    pub write_error: Option<RotorError>,
    /// Limits `write_error` to writes against this object
    pub write_error_target: Option<SecretRef>,
    /// Error to return from `export()`
    pub export_error: Option<RotorError>,
    /// Error to return from `restart()`
    pub restart_error: Option<RotorError>,
}

impl MockCluster {
    /// Creates an empty cluster with no issuer and no cloud identity.
    pub fn new() -> Self {
        Self {
            secrets: RwLock::new(BTreeMap::new()),
            restarts: RwLock::new(Vec::new()),
            pending_polls: RwLock::new(HashMap::new()),
            stuck: RwLock::new(HashSet::new()),
            unready_pods: RwLock::new(HashMap::new()),
            certificates: RwLock::new(Vec::new()),
            renewed: RwLock::new(Vec::new()),
            iam_user: RwLock::new(None),
            iam_keys: RwLock::new(Vec::new()),
            key_counter: RwLock::new(0),
            issuer_installed: false,
            ready_after_polls: 0,
            preflight_error: None,
            write_error: None,
            write_error_target: None,
            export_error: None,
            restart_error: None,
        }
    }

    /// Seeds a secret object with plaintext fields, replacing any existing one.
    pub async fn set_secret<I, K, V>(&self, secret: &SecretRef, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.secrets.write().await.insert(secret.clone(), data);
    }

    /// Returns the plaintext fields of a secret object, if it exists.
    pub async fn secret_fields(&self, secret: &SecretRef) -> Option<BTreeMap<String, String>> {
        self.secrets.read().await.get(secret).cloned()
    }

    /// Makes a workload never become ready (simulates a rollout timeout).
    pub async fn set_stuck(&self, workload: &Workload) {
        self.stuck.write().await.insert(workload.to_string());
    }

    /// Reports `pods` as not running in `namespace`.
    pub async fn set_unready_pods(&self, namespace: &str, pods: Vec<String>) {
        self.unready_pods
            .write()
            .await
            .insert(namespace.to_string(), pods);
    }

    /// Registers a certificate managed by the issuer.
    pub async fn add_certificate(&self, certificate: Certificate) {
        self.certificates.write().await.push(certificate);
    }

    /// Sets the cloud identity and its existing key ids.
    pub async fn set_iam_user(&self, user: &str, keys: &[&str]) {
        *self.iam_user.write().await = Some(user.to_string());
        *self.iam_keys.write().await = keys.iter().map(|k| k.to_string()).collect();
    }

    /// Workloads restarted so far, as `namespace/kind/name`, in order.
    pub async fn restarts(&self) -> Vec<String> {
        self.restarts.read().await.clone()
    }

    /// Certificates renewed so far, as `namespace/certificate/name`.
    pub async fn renewed_certificates(&self) -> Vec<String> {
        self.renewed.read().await.clone()
    }

    /// Current cloud key ids.
    pub async fn iam_keys(&self) -> Vec<String> {
        self.iam_keys.read().await.clone()
    }

    fn write_injected(&self, secret: &SecretRef) -> Result<()> {
        match &self.write_error_target {
            Some(target) if target != secret => Ok(()),
            _ => Self::injected(&self.write_error),
        }
    }

    fn injected(err: &Option<RotorError>) -> Result<()> {
        match err {
            Some(e) => Err(RotorError::CommandFailed(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MockCluster {
    fn name(&self) -> &str {
        "mock"
    }

    async fn exists(&self, secret: &SecretRef) -> Result<bool> {
        Ok(self.secrets.read().await.contains_key(secret))
    }

    async fn export(&self, secret: &SecretRef) -> Result<String> {
        Self::injected(&self.export_error)?;

        let secrets = self.secrets.read().await;
        let data = secrets
            .get(secret)
            .ok_or_else(|| RotorError::NotFound(secret.to_string()))?;

        let document = MockSecretDocument {
            kind: "Secret".to_string(),
            namespace: secret.namespace.clone(),
            name: secret.name.clone(),
            data: data.clone(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    async fn read_field(&self, secret: &SecretRef, key: &str) -> Result<String> {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret)
            .and_then(|fields| fields.get(key))
            .cloned()
            .ok_or_else(|| RotorError::NotFound(format!("{} field {}", secret, key)))
    }

    async fn patch_fields(&self, patch: &SecretPatch) -> Result<()> {
        self.write_injected(&patch.secret)?;

        let mut secrets = self.secrets.write().await;
        let fields = secrets
            .get_mut(&patch.secret)
            .ok_or_else(|| RotorError::NotFound(patch.secret.to_string()))?;

        for (key, value) in &patch.fields {
            fields.insert(key.clone(), value.expose_secret().to_string());
        }
        Ok(())
    }

    async fn apply(&self, manifest: &SecretManifest) -> Result<()> {
        self.write_injected(&manifest.secret)?;

        let data = manifest
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.expose_secret().to_string()))
            .collect();
        self.secrets
            .write()
            .await
            .insert(manifest.secret.clone(), data);
        Ok(())
    }

    async fn restore(&self, document: &str) -> Result<SecretRef> {
        let parsed: MockSecretDocument = serde_json::from_str(document)?;
        if parsed.kind != "Secret" {
            return Err(RotorError::Other(anyhow::anyhow!(
                "document is not a Secret object"
            )));
        }

        let secret = SecretRef::new(parsed.namespace, parsed.name)?;
        self.write_injected(&secret)?;
        self.secrets
            .write()
            .await
            .insert(secret.clone(), parsed.data);
        Ok(secret)
    }
}

#[async_trait]
impl Platform for MockCluster {
    fn name(&self) -> &str {
        "mock"
    }

    async fn preflight(&self) -> Result<()> {
        match &self.preflight_error {
            Some(e) => Err(RotorError::PrerequisiteMissing(e.to_string())),
            None => Ok(()),
        }
    }

    async fn restart(&self, workload: &Workload) -> Result<()> {
        Self::injected(&self.restart_error)?;

        let key = workload.to_string();
        self.restarts.write().await.push(key.clone());
        self.pending_polls
            .write()
            .await
            .insert(key, self.ready_after_polls);
        Ok(())
    }

    async fn is_ready(&self, workload: &Workload) -> Result<bool> {
        let key = workload.to_string();
        if self.stuck.read().await.contains(&key) {
            return Ok(false);
        }

        let mut pending = self.pending_polls.write().await;
        match pending.get_mut(&key) {
            Some(0) | None => Ok(true),
            Some(remaining) => {
                *remaining -= 1;
                Ok(false)
            }
        }
    }

    async fn unready_pods(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .unready_pods
            .read()
            .await
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn has_certificate_issuer(&self) -> Result<bool> {
        Ok(self.issuer_installed)
    }

    async fn list_certificates(&self, namespace: &str) -> Result<Vec<Certificate>> {
        Ok(self
            .certificates
            .read()
            .await
            .iter()
            .filter(|c| c.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn renew_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.renewed.write().await.push(certificate.to_string());
        Ok(())
    }

    async fn certificate_ready(&self, certificate: &Certificate) -> Result<bool> {
        Ok(self
            .renewed
            .read()
            .await
            .contains(&certificate.to_string()))
    }
}

#[async_trait]
impl CloudIam for MockCluster {
    fn name(&self) -> &str {
        "mock"
    }

    async fn current_identity(&self) -> Result<Option<String>> {
        Ok(self.iam_user.read().await.clone())
    }

    async fn create_access_key(&self, user: &str) -> Result<AccessKey> {
        if self.iam_user.read().await.as_deref() != Some(user) {
            return Err(RotorError::NotFound(format!("IAM user {}", user)));
        }

        let mut counter = self.key_counter.write().await;
        *counter += 1;
        let id = format!("AKIAMOCK{:04}", *counter);
        self.iam_keys.write().await.push(id.clone());

        Ok(AccessKey {
            id,
            secret: secrecy::SecretString::from(generate::generate_password(40)),
        })
    }

    async fn list_access_keys(&self, _user: &str) -> Result<Vec<String>> {
        Ok(self.iam_keys.read().await.clone())
    }

    async fn delete_access_key(&self, _user: &str, key_id: &str) -> Result<()> {
        let mut keys = self.iam_keys.write().await;
        let before = keys.len();
        keys.retain(|k| k != key_id);
        if keys.len() == before {
            return Err(RotorError::NotFound(format!("access key {}", key_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::time::Duration;

    fn secret() -> SecretRef {
        SecretRef::new("n8n", "n8n-secrets").unwrap()
    }

    #[tokio::test]
    async fn test_patch_preserves_other_fields() {
        let cluster = MockCluster::new();
        cluster
            .set_secret(&secret(), [("A", "1"), ("B", "2")])
            .await;

        let patch = SecretPatch::new(secret())
            .field("A", SecretString::from("changed"))
            .unwrap();
        cluster.patch_fields(&patch).await.unwrap();

        let fields = cluster.secret_fields(&secret()).await.unwrap();
        assert_eq!(fields["A"], "changed");
        assert_eq!(fields["B"], "2");
    }

    #[tokio::test]
    async fn test_patch_missing_secret() {
        let cluster = MockCluster::new();
        let patch = SecretPatch::new(secret())
            .field("A", SecretString::from("x"))
            .unwrap();
        assert!(matches!(
            cluster.patch_fields(&patch).await,
            Err(RotorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_export_restore_round_trip() {
        let cluster = MockCluster::new();
        cluster.set_secret(&secret(), [("A", "1")]).await;

        let document = cluster.export(&secret()).await.unwrap();
        cluster.set_secret(&secret(), [("A", "2")]).await;

        let restored = cluster.restore(&document).await.unwrap();
        assert_eq!(restored, secret());
        assert_eq!(cluster.read_field(&secret(), "A").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_readiness_after_polls() {
        let mut cluster = MockCluster::new();
        cluster.ready_after_polls = 2;
        let workload = Workload::deployment("n8n", "n8n", Duration::from_secs(1)).unwrap();

        cluster.restart(&workload).await.unwrap();
        assert!(!cluster.is_ready(&workload).await.unwrap());
        assert!(!cluster.is_ready(&workload).await.unwrap());
        assert!(cluster.is_ready(&workload).await.unwrap());
        assert_eq!(cluster.restarts().await, vec!["n8n/deployment/n8n"]);
    }

    #[tokio::test]
    async fn test_error_injection() {
        let mut cluster = MockCluster::new();
        cluster.restart_error = Some(RotorError::CommandFailed("boom".into()));
        let workload = Workload::deployment("n8n", "n8n", Duration::from_secs(1)).unwrap();

        assert!(cluster.restart(&workload).await.is_err());
        assert!(cluster.restarts().await.is_empty());
    }

    #[tokio::test]
    async fn test_iam_keys() {
        let cluster = MockCluster::new();
        assert_eq!(cluster.current_identity().await.unwrap(), None);

        cluster.set_iam_user("n8n", &["AKIAOLD"]).await;
        let key = cluster.create_access_key("n8n").await.unwrap();
        assert_eq!(cluster.iam_keys().await, vec!["AKIAOLD".to_string(), key.id.clone()]);

        cluster.delete_access_key("n8n", "AKIAOLD").await.unwrap();
        assert_eq!(cluster.iam_keys().await, vec![key.id]);
    }
}
