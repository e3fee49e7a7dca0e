//! The rotation/recovery orchestrator.
//!
//! A forward run walks
//! `INIT -> PREREQ_CHECK -> BACKING_UP -> ROTATING -> VERIFYING -> NOTIFYING -> DONE`.
//! Only a failed prerequisite check or a backup that captured nothing stops
//! it early; every other local failure is recorded and the run moves on.
//! Rollback never happens automatically.

use crate::backup::BackupWriter;
use crate::factory::Backends;
use crate::notify::Notifier;
use crate::outcome::RotationRun;
use crate::rollback::{Rollback, RollbackReport};
use crate::rotation::Rotator;
use crate::verify::{VerificationReport, Verifier};
use crate::{BackupSnapshot, Config, Result, RotationTarget, RotorError, SecretRef};
use std::path::{Path, PathBuf};

/// Process exit code for a completed, fully successful command.
pub const EXIT_OK: i32 = 0;
/// Process exit code for prerequisite failures and invalid rollback input.
pub const EXIT_PREREQUISITE: i32 = 1;
/// Process exit code when the command completed but something failed.
pub const EXIT_FAILURES: i32 = 2;

/// Forward run phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Run record created
    Init,
    /// Checking tools and cluster access
    PrereqCheck,
    /// Snapshotting secrets
    BackingUp,
    /// Rotating targets in order
    Rotating,
    /// Probing pod and endpoint health
    Verifying,
    /// Sending the summary
    Notifying,
    /// Finished
    Done,
}

/// Maps a command-level error to its exit code.
pub fn exit_code_for_error(err: &RotorError) -> i32 {
    match err {
        RotorError::PrerequisiteMissing(_)
        | RotorError::ToolNotInstalled(_)
        | RotorError::SnapshotNotFound(_)
        | RotorError::EmptySnapshot(_)
        | RotorError::BackupFailed(_)
        | RotorError::InvalidName(_) => EXIT_PREREQUISITE,
        _ => EXIT_FAILURES,
    }
}

/// Logs the rollback command if a run is abandoned before it finishes.
///
/// Armed once a backup exists; [`RunGuard::finish`] disarms it.
pub struct RunGuard {
    backup: Option<PathBuf>,
    finished: bool,
}

impl RunGuard {
    /// Arms a guard for a run backed up at `backup`.
    pub fn new(backup: Option<PathBuf>) -> Self {
        Self {
            backup,
            finished: false,
        }
    }

    /// Marks the run as finalized.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match &self.backup {
            Some(path) => tracing::error!(
                backup = %path.display(),
                "run interrupted; restore with: keyrotor rollback {}",
                path.display()
            ),
            None => tracing::error!("run interrupted before a backup was taken"),
        }
    }
}

/// Drives forward runs, verification, rollback and backup listing.
pub struct Orchestrator {
    backends: Backends,
    config: Config,
    notifier: Notifier,
}

impl Orchestrator {
    /// Creates an orchestrator with channels taken from the configuration.
    pub fn new(backends: Backends, config: Config) -> Self {
        let notifier = Notifier::from_config(&config);
        Self {
            backends,
            config,
            notifier,
        }
    }

    /// Replaces the notifier.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn preflight(&self) -> Result<()> {
        tracing::info!(phase = ?Phase::PrereqCheck, platform = self.backends.platform.name());
        self.backends.platform.preflight().await.map_err(|e| {
            if e.is_prerequisite() {
                e
            } else {
                RotorError::PrerequisiteMissing(e.to_string())
            }
        })
    }

    /// Secret objects written by `targets`, deduplicated in order.
    fn backup_set(&self, targets: &[RotationTarget]) -> Result<Vec<SecretRef>> {
        let mut secrets: Vec<SecretRef> = Vec::new();
        for target in targets {
            for secret in target.backup_secrets(&self.config)? {
                if !secrets.contains(&secret) {
                    secrets.push(secret);
                }
            }
        }
        Ok(secrets)
    }

    /// Rotates every target in full-run order.
    pub async fn run_full(&self) -> Result<RotationRun> {
        self.run(&RotationTarget::ALL).await
    }

    /// Runs the forward state machine over `targets`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error only when the prerequisite check fails or the backup
    /// captures nothing; both happen before any mutation. Target and
    /// verification failures are recorded in the returned [`RotationRun`].
    pub async fn run(&self, targets: &[RotationTarget]) -> Result<RotationRun> {
        let mut run = RotationRun::new(&self.config.environment);
        tracing::info!(phase = ?Phase::Init, run = %run.id, environment = %run.environment);

        self.preflight().await?;

        tracing::info!(phase = ?Phase::BackingUp);
        let secrets = self.backup_set(targets)?;
        if secrets.is_empty() {
            tracing::info!("selected targets write no secret objects; no backup needed");
        } else {
            let writer = BackupWriter::new(&self.config.backup_root);
            let snapshot = writer
                .snapshot(self.backends.store.as_ref(), &self.config.environment, &secrets)
                .await?;
            tracing::info!(
                backup = %snapshot.location.display(),
                captured = snapshot.secrets.len(),
                "backup complete"
            );
            run.backup = Some(snapshot);
        }

        let guard = RunGuard::new(run.backup.as_ref().map(|b| b.location.clone()));

        tracing::info!(phase = ?Phase::Rotating, targets = targets.len());
        let rotator = Rotator::new(self.backends.clone(), self.config.clone());
        for target in targets {
            let outcome = rotator.rotate(*target).await;
            run.outcomes.push(outcome);
        }

        tracing::info!(phase = ?Phase::Verifying);
        run.verification = Some(self.verifier()?.verify().await);

        tracing::info!(phase = ?Phase::Notifying);
        self.notifier
            .notify(&self.subject(run.is_success()), &run.summary(false))
            .await;

        guard.finish();
        self.log_summary(&run);
        tracing::info!(phase = ?Phase::Done, success = run.is_success());
        Ok(run)
    }

    /// Runs the verification probes on their own.
    pub async fn verify(&self) -> Result<VerificationReport> {
        self.preflight().await?;
        Ok(self.verifier()?.verify().await)
    }

    /// Restores the snapshot at `location` and restarts dependents.
    pub async fn rollback(&self, location: impl AsRef<Path>) -> Result<RollbackReport> {
        self.preflight().await?;

        let report = Rollback::new(self.backends.clone(), self.config.clone())
            .run(location)
            .await?;

        let body = format!(
            "Rolled back to {}\nRestored: {}\nFailed: {}\nRestart failures: {}\n",
            report.snapshot.location.display(),
            report.restored.len(),
            report.failed.len(),
            report.restart_failures.len()
        );
        let subject = format!(
            "[{}] credential rollback {}",
            self.config.environment,
            if report.is_success() { "succeeded" } else { "completed with failures" }
        );
        self.notifier.notify(&subject, &body).await;

        Ok(report)
    }

    /// Lists snapshots under the backup root, newest first.
    pub async fn backups(&self) -> Result<Vec<BackupSnapshot>> {
        BackupWriter::new(&self.config.backup_root).list().await
    }

    fn verifier(&self) -> Result<Verifier> {
        Verifier::new(self.backends.platform.clone(), &self.config)
    }

    fn subject(&self, success: bool) -> String {
        format!(
            "[{}] credential rotation {}",
            self.config.environment,
            if success { "succeeded" } else { "completed with failures" }
        )
    }

    fn log_summary(&self, run: &RotationRun) {
        let revealed = run.outcomes.iter().any(|o| !o.revealed.is_empty());
        if revealed {
            // Only place generated values are ever written out.
            tracing::warn!("\n{}", run.summary(true));
        } else if run.is_success() {
            tracing::info!("\n{}", run.summary(false));
        } else {
            tracing::error!("\n{}", run.summary(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code_for_error(&RotorError::ToolNotInstalled("kubectl".into())),
            EXIT_PREREQUISITE
        );
        assert_eq!(
            exit_code_for_error(&RotorError::SnapshotNotFound("x".into())),
            EXIT_PREREQUISITE
        );
        assert_eq!(
            exit_code_for_error(&RotorError::CommandFailed("boom".into())),
            EXIT_FAILURES
        );
    }

    #[test]
    fn test_run_guard_finish() {
        let guard = RunGuard::new(Some(PathBuf::from("secret-backups/20240101_000000")));
        guard.finish();

        let _abandoned = RunGuard::new(None);
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_backup_set_selection() {
        use crate::backends::mock::MockCluster;
        use std::sync::Arc;

        let orchestrator = Orchestrator::new(
            Backends::mock(Arc::new(MockCluster::new())),
            Config::default(),
        );

        let names = |targets: &[RotationTarget]| -> Vec<String> {
            orchestrator
                .backup_set(targets)
                .unwrap()
                .iter()
                .map(|s| s.to_string())
                .collect()
        };

        assert_eq!(
            names(&[RotationTarget::DatabasePassword, RotationTarget::AdminPassword]),
            vec!["n8n/postgres-secrets", "n8n/n8n-secrets"]
        );
        assert!(names(&[RotationTarget::TlsCertificates]).is_empty());
        assert_eq!(names(&RotationTarget::ALL).len(), 5);
    }
}
