//! Kubernetes backend implementation.

use super::resources;
use crate::cli::{check_command_exists, run_command, run_command_with_stdin};
use crate::validation::validate_resource_name;
use crate::{
    Certificate, Platform, Result, RotorError, SecretManifest, SecretPatch, SecretRef,
    SecretStore, Workload,
};
use async_trait::async_trait;
use serde_json::Value;

/// Kubernetes backend driven through `kubectl`.
pub struct KubectlBackend {
    program: String,
    context: Option<String>,
}

impl KubectlBackend {
    /// Creates a backend using `kubectl` from `PATH` and the current context.
    pub fn new() -> Self {
        Self {
            program: "kubectl".to_string(),
            context: None,
        }
    }

    /// Pins every call to a named kubeconfig context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn base_args(&self) -> Vec<String> {
        match &self.context {
            Some(ctx) => vec!["--context".to_string(), ctx.clone()],
            None => Vec::new(),
        }
    }

    async fn kubectl(&self, args: &[&str]) -> Result<String> {
        let mut full = self.base_args();
        full.extend(args.iter().map(|a| a.to_string()));
        let refs: Vec<&str> = full.iter().map(String::as_str).collect();
        run_command(&self.program, &refs, &[]).await
    }

    async fn kubectl_stdin(&self, args: &[&str], stdin: &str) -> Result<String> {
        let mut full = self.base_args();
        full.extend(args.iter().map(|a| a.to_string()));
        let refs: Vec<&str> = full.iter().map(String::as_str).collect();
        run_command_with_stdin(&self.program, &refs, &[], stdin).await
    }

    async fn get_json(&self, args: &[&str]) -> Result<Value> {
        let mut full: Vec<&str> = vec!["get"];
        full.extend_from_slice(args);
        full.extend_from_slice(&["-o", "json"]);
        let output = self.kubectl(&full).await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn get_secret(&self, secret: &SecretRef) -> Result<Value> {
        self.get_json(&["secret", &secret.name, "-n", &secret.namespace])
            .await
            .map_err(|e| not_found_as(e, secret.to_string()))
    }
}

impl Default for KubectlBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps kubectl's `NotFound` diagnostics onto [`RotorError::NotFound`].
fn not_found_as(err: RotorError, what: String) -> RotorError {
    match err {
        RotorError::CommandFailed(msg) if msg.contains("NotFound") || msg.contains("not found") => {
            RotorError::NotFound(what)
        }
        other => other,
    }
}

fn is_missing_resource_type(err: &RotorError) -> bool {
    matches!(err, RotorError::CommandFailed(msg)
        if msg.contains("doesn't have a resource type") || msg.contains("no matches for kind"))
}

#[async_trait]
impl SecretStore for KubectlBackend {
    fn name(&self) -> &str {
        "kubectl"
    }

    async fn exists(&self, secret: &SecretRef) -> Result<bool> {
        match self.get_secret(secret).await {
            Ok(_) => Ok(true),
            Err(RotorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn export(&self, secret: &SecretRef) -> Result<String> {
        let object = self.get_secret(secret).await?;
        let stripped = resources::strip_server_metadata(object);
        Ok(serde_json::to_string_pretty(&stripped)?)
    }

    async fn read_field(&self, secret: &SecretRef, key: &str) -> Result<String> {
        let object = self.get_secret(secret).await?;
        resources::decode_field(&object, key)?
            .ok_or_else(|| RotorError::NotFound(format!("{} field {}", secret, key)))
    }

    async fn patch_fields(&self, patch: &SecretPatch) -> Result<()> {
        let body = serde_json::to_string(&resources::data_patch(patch))?;
        let secret = &patch.secret;

        self.kubectl_stdin(
            &[
                "patch",
                "secret",
                &secret.name,
                "-n",
                &secret.namespace,
                "--type",
                "merge",
                "--patch-file",
                "/dev/stdin",
            ],
            &body,
        )
        .await
        .map_err(|e| not_found_as(e, secret.to_string()))?;

        tracing::debug!(secret = %secret, fields = ?patch.keys().collect::<Vec<_>>(), "secret patched");
        Ok(())
    }

    async fn apply(&self, manifest: &SecretManifest) -> Result<()> {
        let body = serde_json::to_string(&resources::secret_object(manifest))?;
        self.kubectl_stdin(&["apply", "-f", "-"], &body).await?;
        tracing::debug!(secret = %manifest.secret, "secret applied");
        Ok(())
    }

    async fn restore(&self, document: &str) -> Result<SecretRef> {
        let object: Value = serde_json::from_str(document)?;
        let secret = resources::secret_ref_of(&object)?;
        self.kubectl_stdin(&["apply", "-f", "-"], document).await?;
        Ok(secret)
    }
}

#[async_trait]
impl Platform for KubectlBackend {
    fn name(&self) -> &str {
        "kubectl"
    }

    async fn preflight(&self) -> Result<()> {
        if !check_command_exists(&self.program).await? {
            return Err(RotorError::ToolNotInstalled(
                "kubectl command not found - install kubectl and configure cluster access"
                    .to_string(),
            ));
        }

        self.kubectl(&["cluster-info"]).await.map_err(|e| {
            RotorError::PrerequisiteMissing(format!("cannot reach Kubernetes cluster: {}", e))
        })?;

        Ok(())
    }

    async fn restart(&self, workload: &Workload) -> Result<()> {
        self.kubectl(&[
            "rollout",
            "restart",
            &workload.resource(),
            "-n",
            &workload.namespace,
        ])
        .await?;
        Ok(())
    }

    async fn is_ready(&self, workload: &Workload) -> Result<bool> {
        let kind = workload.kind.to_string();
        let object = self
            .get_json(&[&kind, &workload.name, "-n", &workload.namespace])
            .await
            .map_err(|e| not_found_as(e, workload.to_string()))?;
        Ok(resources::rollout_complete(workload.kind, &object))
    }

    async fn unready_pods(&self, namespace: &str) -> Result<Vec<String>> {
        validate_resource_name(namespace)?;
        let list = self.get_json(&["pods", "-n", namespace]).await?;
        Ok(resources::unready_pod_names(&list))
    }

    async fn has_certificate_issuer(&self) -> Result<bool> {
        match self.get_json(&["clusterissuers.cert-manager.io"]).await {
            Ok(list) => Ok(resources::item_count(&list) > 0),
            Err(e) if is_missing_resource_type(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_certificates(&self, namespace: &str) -> Result<Vec<Certificate>> {
        validate_resource_name(namespace)?;
        let list = self
            .get_json(&["certificates.cert-manager.io", "-n", namespace])
            .await?;
        Ok(resources::certificates(&list, namespace))
    }

    async fn renew_certificate(&self, certificate: &Certificate) -> Result<()> {
        validate_resource_name(&certificate.secret_name)?;
        self.kubectl(&[
            "delete",
            "secret",
            &certificate.secret_name,
            "-n",
            &certificate.namespace,
            "--ignore-not-found",
        ])
        .await?;
        Ok(())
    }

    async fn certificate_ready(&self, certificate: &Certificate) -> Result<bool> {
        let object = self
            .get_json(&[
                "certificates.cert-manager.io",
                &certificate.name,
                "-n",
                &certificate.namespace,
            ])
            .await?;
        if !resources::certificate_is_ready(&object) {
            return Ok(false);
        }

        let secret = SecretRef::new(&certificate.namespace, &certificate.secret_name)?;
        self.exists(&secret).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_args_with_context() {
        let backend = KubectlBackend::new().with_context("prod-eu");
        assert_eq!(backend.base_args(), vec!["--context", "prod-eu"]);
        assert!(KubectlBackend::new().base_args().is_empty());
    }

    #[test]
    fn test_not_found_mapping() {
        let err = RotorError::CommandFailed(
            "kubectl failed with exit code 1: Error from server (NotFound): secrets \"x\" not found"
                .to_string(),
        );
        assert!(matches!(
            not_found_as(err, "n8n/x".to_string()),
            RotorError::NotFound(_)
        ));

        let other = RotorError::CommandFailed("connection refused".to_string());
        assert!(matches!(
            not_found_as(other, "n8n/x".to_string()),
            RotorError::CommandFailed(_)
        ));
    }

    #[test]
    fn test_missing_resource_type() {
        let err = RotorError::CommandFailed(
            "error: the server doesn't have a resource type \"clusterissuers\"".to_string(),
        );
        assert!(is_missing_resource_type(&err));
        assert!(!is_missing_resource_type(&RotorError::NotFound("x".into())));
    }
}
