//! Backend traits for the external systems the orchestrator drives.
//!
//! The orchestrator never talks to `kubectl` or `aws` directly; it goes
//! through these three seams:
//!
//! - [`SecretStore`]: reads, exports, patches and restores secret objects
//! - [`Platform`]: restarts workloads and reports readiness and pod health
//! - [`CloudIam`]: manages cloud access keys for the current identity
//!
//! Concrete implementations live in [`crate::backends`].

use crate::{Certificate, Result, SecretManifest, SecretPatch, SecretRef, Workload};
use async_trait::async_trait;
use secrecy::SecretString;

/// External secret storage.
///
/// All implementations must be `Send + Sync`.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the backend name (e.g., "kubectl", "mock").
    fn name(&self) -> &str;

    /// Checks if a secret object exists.
    async fn exists(&self, secret: &SecretRef) -> Result<bool>;

    /// Exports the current serialized representation of a secret object.
    ///
    /// Server-managed metadata (resource version, uid, timestamps) is
    /// stripped, so the document can be re-applied verbatim by [`restore`].
    ///
    /// # Errors
    ///
    /// - [`RotorError::NotFound`](crate::RotorError::NotFound): object does not exist
    ///
    /// [`restore`]: SecretStore::restore
    async fn export(&self, secret: &SecretRef) -> Result<String>;

    /// Reads one decoded field of a secret object.
    ///
    /// # Errors
    ///
    /// - [`RotorError::NotFound`](crate::RotorError::NotFound): object or field does not exist
    async fn read_field(&self, secret: &SecretRef, key: &str) -> Result<String>;

    /// Overwrites the named fields of an existing object.
    ///
    /// Fields not named in the patch are left untouched.
    ///
    /// # Errors
    ///
    /// - [`RotorError::NotFound`](crate::RotorError::NotFound): object does not exist
    async fn patch_fields(&self, patch: &SecretPatch) -> Result<()>;

    /// Creates the object or replaces it entirely (idempotent).
    async fn apply(&self, manifest: &SecretManifest) -> Result<()>;

    /// Re-applies a document produced by [`SecretStore::export`] and returns
    /// the object it restored.
    async fn restore(&self, document: &str) -> Result<SecretRef>;
}

/// Workload lifecycle and cluster health.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Verifies that the control-plane tool is installed and the cluster is
    /// reachable.
    ///
    /// # Errors
    ///
    /// - [`RotorError::ToolNotInstalled`](crate::RotorError::ToolNotInstalled)
    /// - [`RotorError::PrerequisiteMissing`](crate::RotorError::PrerequisiteMissing)
    async fn preflight(&self) -> Result<()>;

    /// Triggers a rolling restart of a workload. Does not wait.
    async fn restart(&self, workload: &Workload) -> Result<()>;

    /// Reports whether a workload's rollout is complete and all replicas ready.
    async fn is_ready(&self, workload: &Workload) -> Result<bool>;

    /// Lists pods in `namespace` that are neither running nor completed.
    async fn unready_pods(&self, namespace: &str) -> Result<Vec<String>>;

    /// Reports whether a certificate issuer is installed in the cluster.
    async fn has_certificate_issuer(&self) -> Result<bool>;

    /// Lists certificates managed in `namespace`.
    async fn list_certificates(&self, namespace: &str) -> Result<Vec<Certificate>>;

    /// Forces reissue of a certificate.
    async fn renew_certificate(&self, certificate: &Certificate) -> Result<()>;

    /// Reports whether a certificate is issued and ready.
    async fn certificate_ready(&self, certificate: &Certificate) -> Result<bool>;
}

/// A freshly created cloud access key pair.
///
/// The secret half is only ever returned at creation time.
#[derive(Debug)]
pub struct AccessKey {
    /// Public key identifier
    pub id: String,
    /// Secret half
    pub secret: SecretString,
}

/// Cloud identity and access key management.
#[async_trait]
pub trait CloudIam: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Resolves the user name of the current identity.
    ///
    /// Returns `Ok(None)` when no identity can be resolved (CLI missing or
    /// not configured); callers treat that as a skip condition.
    async fn current_identity(&self) -> Result<Option<String>>;

    /// Creates a new access key for `user`.
    async fn create_access_key(&self, user: &str) -> Result<AccessKey>;

    /// Lists key identifiers for `user`.
    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>>;

    /// Deletes one access key.
    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<()>;
}
