//! Rotation operations, one per [`RotationTarget`].
//!
//! Every operation follows the same protocol: generate new values, write
//! only the fields the target owns, restart each dependent workload and
//! block until it is ready. Any step failure becomes a failed
//! [`RotationOutcome`]; it never propagates out of [`Rotator::rotate`], so
//! the caller can move on to the next target.

use crate::factory::Backends;
use crate::generate::{generate_api_key, generate_password};
use crate::outcome::{RevealedValue, RotationOutcome};
use crate::poll::{poll_until, PollPolicy};
use crate::target::{API_TOKENS_SECRET, APP_SECRET, AWS_SECRET, GRAFANA_SECRET, POSTGRES_SECRET};
use crate::{
    Config, Platform, Result, RotationTarget, RotorError, SecretManifest, SecretPatch, SecretRef,
    Workload,
};
use secrecy::SecretString;
use std::time::Duration;

/// Prefix of the generated application API key.
pub const API_KEY_PREFIX: &str = "n8n";
/// Prefix of the generated webhook token.
pub const WEBHOOK_TOKEN_PREFIX: &str = "whk";

/// Restarts a workload and waits until the platform reports it ready.
///
/// The wait is bounded by the workload's own timeout, probed every
/// `interval`. Expiry is a hard failure; there is no retry.
pub async fn restart_and_wait(
    platform: &dyn Platform,
    workload: &Workload,
    interval: Duration,
) -> Result<()> {
    tracing::info!(workload = %workload, timeout = ?workload.timeout, "restarting");
    platform.restart(workload).await?;

    let policy = PollPolicy::for_timeout(workload.timeout, interval);
    poll_until(policy, &workload.to_string(), || platform.is_ready(workload)).await?;

    tracing::info!(workload = %workload, "ready");
    Ok(())
}

fn step(target: RotationTarget, operation: &'static str) -> impl FnOnce(RotorError) -> RotorError {
    move |e| RotorError::target_op(target.name(), operation, e)
}

/// Executes rotation operations against a set of backends.
pub struct Rotator {
    backends: Backends,
    config: Config,
}

impl Rotator {
    /// Creates a rotator.
    pub fn new(backends: Backends, config: Config) -> Self {
        Self { backends, config }
    }

    /// Rotates one target and reports the outcome.
    pub async fn rotate(&self, target: RotationTarget) -> RotationOutcome {
        tracing::info!(target = %target, "rotating");

        let result = match target {
            RotationTarget::DatabasePassword => self.rotate_database_password().await,
            RotationTarget::AdminPassword => self.rotate_admin_password().await,
            RotationTarget::MonitoringPassword => self.rotate_monitoring_password().await,
            RotationTarget::TlsCertificates => self.rotate_tls_certificates().await,
            RotationTarget::CloudAccessKeys => self.rotate_cloud_access_keys().await,
            RotationTarget::ApiTokens => self.rotate_api_tokens().await,
        };

        match result {
            Ok(outcome) => {
                if outcome.is_skipped() {
                    tracing::warn!(target = %target, status = ?outcome.status, "target skipped");
                } else {
                    tracing::info!(target = %target, "target rotated");
                }
                outcome
            }
            Err(e) => {
                tracing::error!(target = %target, error = %e, "target failed");
                match e {
                    RotorError::TargetOperation {
                        operation, source, ..
                    } => RotationOutcome::failed(target, format!("{}: {}", operation, source)),
                    other => RotationOutcome::failed(target, other),
                }
            }
        }
    }

    async fn restart_dependents(&self, target: RotationTarget) -> Result<()> {
        for workload in target.dependent_services(&self.config)? {
            restart_and_wait(
                self.backends.platform.as_ref(),
                &workload,
                self.config.poll_interval,
            )
            .await
            .map_err(step(target, "restart"))?;
        }
        Ok(())
    }

    async fn patch_one(
        &self,
        target: RotationTarget,
        secret: SecretRef,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.patch_field(secret, key, value)
            .await
            .map_err(step(target, "patch"))
    }

    async fn patch_field(&self, secret: SecretRef, key: &str, value: &str) -> Result<()> {
        let patch = SecretPatch::new(secret).field(key, SecretString::from(value.to_string()))?;
        tracing::debug!(secret = %patch.secret, field = key, "patching secret");
        self.backends.store.patch_fields(&patch).await
    }

    async fn rotate_database_password(&self) -> Result<RotationOutcome> {
        let target = RotationTarget::DatabasePassword;
        let ns = self.config.namespace.as_str();
        let password = generate_password(self.config.password_length);

        // The server and its client must end up with the same value.
        self.patch_one(target, SecretRef::new(ns, POSTGRES_SECRET)?, "POSTGRES_PASSWORD", &password)
            .await?;
        if let Err(e) = self
            .patch_field(SecretRef::new(ns, APP_SECRET)?, "DB_POSTGRESDB_PASSWORD", &password)
            .await
        {
            // Nothing was restarted, so running workloads still use the old value.
            tracing::error!(
                "{} was updated but {} was not; roll back from the snapshot before restarting either",
                POSTGRES_SECRET,
                APP_SECRET
            );
            return Err(RotorError::target_op(
                target.name(),
                format!(
                    "patch {} (database password now differs from {})",
                    APP_SECRET, POSTGRES_SECRET
                ),
                e,
            ));
        }

        self.restart_dependents(target).await?;
        Ok(RotationOutcome::succeeded(target))
    }

    async fn rotate_admin_password(&self) -> Result<RotationOutcome> {
        let target = RotationTarget::AdminPassword;
        let password = generate_password(self.config.password_length);

        self.patch_one(
            target,
            SecretRef::new(&self.config.namespace, APP_SECRET)?,
            "N8N_BASIC_AUTH_PASSWORD",
            &password,
        )
        .await?;

        self.restart_dependents(target).await?;
        Ok(RotationOutcome::succeeded_with(
            target,
            vec![RevealedValue {
                label: "n8n admin password".to_string(),
                value: SecretString::from(password),
            }],
        ))
    }

    async fn rotate_monitoring_password(&self) -> Result<RotationOutcome> {
        let target = RotationTarget::MonitoringPassword;
        let password = generate_password(self.config.password_length);

        self.patch_one(
            target,
            SecretRef::new(&self.config.monitoring_namespace, GRAFANA_SECRET)?,
            "admin-password",
            &password,
        )
        .await?;

        self.restart_dependents(target).await?;
        Ok(RotationOutcome::succeeded_with(
            target,
            vec![RevealedValue {
                label: "grafana admin password".to_string(),
                value: SecretString::from(password),
            }],
        ))
    }

    async fn rotate_tls_certificates(&self) -> Result<RotationOutcome> {
        let target = RotationTarget::TlsCertificates;
        let platform = self.backends.platform.as_ref();

        let installed = platform
            .has_certificate_issuer()
            .await
            .map_err(step(target, "detect issuer"))?;
        if !installed {
            return Ok(RotationOutcome::skipped(
                target,
                "no certificate issuer installed",
            ));
        }

        let certificates = platform
            .list_certificates(&self.config.namespace)
            .await
            .map_err(step(target, "list certificates"))?;
        if certificates.is_empty() {
            tracing::info!(namespace = %self.config.namespace, "no certificates to renew");
        }

        let policy = PollPolicy::for_timeout(self.config.certificate_timeout, self.config.poll_interval);
        for certificate in &certificates {
            tracing::info!(certificate = %certificate, "renewing certificate");
            platform
                .renew_certificate(certificate)
                .await
                .map_err(step(target, "renew"))?;

            poll_until(policy, &certificate.to_string(), || {
                platform.certificate_ready(certificate)
            })
            .await
            .map_err(step(target, "await certificate"))?;
            tracing::info!(certificate = %certificate, "certificate ready");
        }

        Ok(RotationOutcome::succeeded(target))
    }

    async fn rotate_cloud_access_keys(&self) -> Result<RotationOutcome> {
        let target = RotationTarget::CloudAccessKeys;
        let iam = self.backends.iam.as_ref();

        let user = match iam.current_identity().await.map_err(step(target, "resolve identity"))? {
            Some(user) => user,
            None => {
                return Ok(RotationOutcome::skipped(
                    target,
                    "no cloud identity could be resolved",
                ))
            }
        };

        let existing = iam
            .list_access_keys(&user)
            .await
            .map_err(step(target, "list keys"))?;
        let key = iam
            .create_access_key(&user)
            .await
            .map_err(step(target, "create key"))?;
        tracing::info!(user = %user, key_id = %key.id, "created access key");

        let secret = SecretRef::new(&self.config.namespace, AWS_SECRET)?;
        let patch = SecretPatch::new(secret)
            .field("AWS_ACCESS_KEY_ID", SecretString::from(key.id.clone()))?
            .field("AWS_SECRET_ACCESS_KEY", key.secret)?;
        if let Err(e) = self.backends.store.patch_fields(&patch).await {
            // Nothing references the new key yet; drop it so the old one stays the only one.
            if let Err(cleanup) = iam.delete_access_key(&user, &key.id).await {
                tracing::warn!(key_id = %key.id, error = %cleanup, "could not delete unused access key");
            }
            return Err(step(target, "patch")(e));
        }

        self.restart_dependents(target).await?;

        tracing::info!(grace = ?self.config.iam_grace_period, "waiting before revoking previous keys");
        tokio::time::sleep(self.config.iam_grace_period).await;

        for old in existing.iter().filter(|id| **id != key.id) {
            iam.delete_access_key(&user, old)
                .await
                .map_err(step(target, "revoke key"))?;
            tracing::info!(user = %user, key_id = %old, "revoked access key");
        }

        Ok(RotationOutcome::succeeded(target))
    }

    async fn rotate_api_tokens(&self) -> Result<RotationOutcome> {
        let target = RotationTarget::ApiTokens;
        let api_key = generate_api_key(API_KEY_PREFIX);
        let webhook_token = generate_api_key(WEBHOOK_TOKEN_PREFIX);

        let manifest = SecretManifest::new(SecretRef::new(&self.config.namespace, API_TOKENS_SECRET)?)
            .field("N8N_API_KEY", SecretString::from(api_key.clone()))?
            .field("WEBHOOK_TOKEN", SecretString::from(webhook_token.clone()))?;
        self.backends
            .store
            .apply(&manifest)
            .await
            .map_err(step(target, "apply"))?;

        self.restart_dependents(target).await?;
        Ok(RotationOutcome::succeeded_with(
            target,
            vec![
                RevealedValue {
                    label: "n8n API key".to_string(),
                    value: SecretString::from(api_key),
                },
                RevealedValue {
                    label: "webhook token".to_string(),
                    value: SecretString::from(webhook_token),
                },
            ],
        ))
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backends::mock::MockCluster;
    use crate::outcome::OutcomeStatus;
    use crate::Certificate;
    use secrecy::ExposeSecret;
    use std::sync::Arc;

    fn fast_config() -> Config {
        Config::new("test")
            .with_poll_interval(Duration::from_millis(1))
            .with_timeouts(Duration::from_millis(5), Duration::from_millis(10))
            .with_certificate_timeout(Duration::from_millis(5))
            .with_iam_grace_period(Duration::ZERO)
    }

    fn rotator(cluster: Arc<MockCluster>) -> Rotator {
        Rotator::new(Backends::mock(cluster), fast_config())
    }

    fn secret(ns: &str, name: &str) -> SecretRef {
        SecretRef::new(ns, name).unwrap()
    }

    #[tokio::test]
    async fn test_database_password_shared_value() {
        let cluster = Arc::new(MockCluster::new());
        cluster
            .set_secret(&secret("n8n", POSTGRES_SECRET), [("POSTGRES_PASSWORD", "old")])
            .await;
        cluster
            .set_secret(
                &secret("n8n", APP_SECRET),
                [("DB_POSTGRESDB_PASSWORD", "old"), ("N8N_ENCRYPTION_KEY", "keep")],
            )
            .await;

        let outcome = rotator(cluster.clone())
            .rotate(RotationTarget::DatabasePassword)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert!(outcome.revealed.is_empty());

        let pg = cluster.secret_fields(&secret("n8n", POSTGRES_SECRET)).await.unwrap();
        let app = cluster.secret_fields(&secret("n8n", APP_SECRET)).await.unwrap();
        assert_ne!(pg["POSTGRES_PASSWORD"], "old");
        assert_eq!(pg["POSTGRES_PASSWORD"].len(), 32);
        assert_eq!(pg["POSTGRES_PASSWORD"], app["DB_POSTGRESDB_PASSWORD"]);
        assert_eq!(app["N8N_ENCRYPTION_KEY"], "keep");

        assert_eq!(
            cluster.restarts().await,
            vec!["n8n/statefulset/postgres", "n8n/deployment/n8n"]
        );
    }

    #[tokio::test]
    async fn test_database_password_split_when_client_patch_fails() {
        let mut cluster = MockCluster::new();
        cluster.write_error = Some(RotorError::CommandFailed("forbidden".to_string()));
        cluster.write_error_target = Some(secret("n8n", APP_SECRET));
        let cluster = Arc::new(cluster);
        cluster
            .set_secret(&secret("n8n", POSTGRES_SECRET), [("POSTGRES_PASSWORD", "old")])
            .await;
        cluster
            .set_secret(&secret("n8n", APP_SECRET), [("DB_POSTGRESDB_PASSWORD", "old")])
            .await;

        let outcome = rotator(cluster.clone())
            .rotate(RotationTarget::DatabasePassword)
            .await;

        match outcome.status {
            OutcomeStatus::Failed { error } => {
                assert!(error.contains("database password now differs from postgres-secrets"));
                assert!(error.contains("forbidden"));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let pg = cluster.secret_fields(&secret("n8n", POSTGRES_SECRET)).await.unwrap();
        let app = cluster.secret_fields(&secret("n8n", APP_SECRET)).await.unwrap();
        assert_ne!(pg["POSTGRES_PASSWORD"], "old");
        assert_eq!(app["DB_POSTGRESDB_PASSWORD"], "old");
        assert!(cluster.restarts().await.is_empty());
    }

    #[tokio::test]
    async fn test_admin_password_revealed() {
        let cluster = Arc::new(MockCluster::new());
        cluster
            .set_secret(&secret("n8n", APP_SECRET), [("N8N_BASIC_AUTH_PASSWORD", "old")])
            .await;

        let outcome = rotator(cluster.clone()).rotate(RotationTarget::AdminPassword).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.revealed.len(), 1);

        let stored = cluster
            .secret_fields(&secret("n8n", APP_SECRET))
            .await
            .unwrap()["N8N_BASIC_AUTH_PASSWORD"]
            .clone();
        assert_eq!(outcome.revealed[0].value.expose_secret(), stored);
    }

    #[tokio::test]
    async fn test_missing_secret_fails_without_restart() {
        let cluster = Arc::new(MockCluster::new());

        let outcome = rotator(cluster.clone())
            .rotate(RotationTarget::MonitoringPassword)
            .await;

        match outcome.status {
            OutcomeStatus::Failed { error } => assert!(error.starts_with("patch: not found")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(cluster.restarts().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_timeout_fails() {
        let cluster = Arc::new(MockCluster::new());
        cluster
            .set_secret(&secret("monitoring", GRAFANA_SECRET), [("admin-password", "old")])
            .await;
        let config = fast_config();
        let grafana = &RotationTarget::MonitoringPassword.dependent_services(&config).unwrap()[0];
        cluster.set_stuck(grafana).await;

        let outcome = rotator(cluster).rotate(RotationTarget::MonitoringPassword).await;
        match outcome.status {
            OutcomeStatus::Failed { error } => assert!(error.contains("timed out")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(outcome.revealed.is_empty());
    }

    #[tokio::test]
    async fn test_tls_skipped_without_issuer() {
        let cluster = Arc::new(MockCluster::new());
        cluster
            .add_certificate(Certificate {
                namespace: "n8n".into(),
                name: "n8n-tls".into(),
                secret_name: "n8n-tls".into(),
            })
            .await;

        let outcome = rotator(cluster.clone()).rotate(RotationTarget::TlsCertificates).await;
        assert!(outcome.is_skipped());
        assert!(cluster.renewed_certificates().await.is_empty());
    }

    #[tokio::test]
    async fn test_tls_renews_certificates() {
        let mut cluster = MockCluster::new();
        cluster.issuer_installed = true;
        let cluster = Arc::new(cluster);
        cluster
            .add_certificate(Certificate {
                namespace: "n8n".into(),
                name: "n8n-tls".into(),
                secret_name: "n8n-tls".into(),
            })
            .await;

        let outcome = rotator(cluster.clone()).rotate(RotationTarget::TlsCertificates).await;
        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(cluster.renewed_certificates().await, vec!["n8n/certificate/n8n-tls"]);
    }

    #[tokio::test]
    async fn test_cloud_keys_skipped_without_identity() {
        let cluster = Arc::new(MockCluster::new());
        let outcome = rotator(cluster).rotate(RotationTarget::CloudAccessKeys).await;
        assert!(outcome.is_skipped());
    }

    #[tokio::test]
    async fn test_cloud_keys_create_then_revoke() {
        let cluster = Arc::new(MockCluster::new());
        cluster.set_iam_user("n8n-app", &["AKIAOLD"]).await;
        cluster
            .set_secret(&secret("n8n", AWS_SECRET), [("AWS_ACCESS_KEY_ID", "AKIAOLD")])
            .await;

        let outcome = rotator(cluster.clone()).rotate(RotationTarget::CloudAccessKeys).await;
        assert_eq!(outcome.status, OutcomeStatus::Succeeded);

        let keys = cluster.iam_keys().await;
        assert_eq!(keys, vec!["AKIAMOCK0001"]);
        let fields = cluster.secret_fields(&secret("n8n", AWS_SECRET)).await.unwrap();
        assert_eq!(fields["AWS_ACCESS_KEY_ID"], "AKIAMOCK0001");
        assert!(!fields["AWS_SECRET_ACCESS_KEY"].is_empty());
    }

    #[tokio::test]
    async fn test_cloud_keys_patch_failure_keeps_old_key() {
        let cluster = Arc::new(MockCluster::new());
        cluster.set_iam_user("n8n-app", &["AKIAOLD"]).await;

        let outcome = rotator(cluster.clone()).rotate(RotationTarget::CloudAccessKeys).await;
        assert!(!outcome.is_ok());
        assert_eq!(cluster.iam_keys().await, vec!["AKIAOLD"]);
    }

    #[tokio::test]
    async fn test_api_tokens_created() {
        let cluster = Arc::new(MockCluster::new());

        let outcome = rotator(cluster.clone()).rotate(RotationTarget::ApiTokens).await;
        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(outcome.revealed.len(), 2);

        let fields = cluster
            .secret_fields(&secret("n8n", API_TOKENS_SECRET))
            .await
            .unwrap();
        assert!(fields["N8N_API_KEY"].starts_with("n8n_"));
        assert_eq!(fields["N8N_API_KEY"].len(), 4 + 64);
        assert!(fields["WEBHOOK_TOKEN"].starts_with("whk_"));
        assert_eq!(cluster.restarts().await, vec!["n8n/deployment/n8n"]);
    }
}
