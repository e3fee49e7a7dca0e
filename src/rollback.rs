//! Manual rollback from a backup snapshot.
//!
//! Rollback is its own small state machine,
//! `VALIDATE_SNAPSHOT -> RESTORING -> RESTARTING -> DONE`, and is only ever
//! entered by explicit operator request.

use crate::factory::Backends;
use crate::rotation::restart_and_wait;
use crate::{BackupSnapshot, Config, Result, RotationTarget, SecretRef};
use serde::Serialize;
use std::path::Path;

/// Rollback phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPhase {
    /// Checking the snapshot location
    ValidateSnapshot,
    /// Re-applying exported objects
    Restoring,
    /// Restarting dependent workloads
    Restarting,
    /// Finished
    Done,
}

/// What a rollback did.
#[derive(Debug, Serialize)]
pub struct RollbackReport {
    /// Snapshot that was restored
    pub snapshot: BackupSnapshot,

    /// Objects re-applied
    pub restored: Vec<SecretRef>,

    /// Objects that could not be re-applied
    pub failed: Vec<String>,

    /// Workloads restarted and ready
    pub restarted: Vec<String>,

    /// Workloads that failed to restart or become ready
    pub restart_failures: Vec<String>,
}

impl RollbackReport {
    /// True when every object and workload came back.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.restart_failures.is_empty()
    }
}

/// Restores secret state from a snapshot and restarts dependents.
pub struct Rollback {
    backends: Backends,
    config: Config,
}

impl Rollback {
    /// Creates a rollback executor.
    pub fn new(backends: Backends, config: Config) -> Self {
        Self { backends, config }
    }

    /// Rolls back to the snapshot at `location`.
    ///
    /// Objects present in the snapshot are re-applied one by one; an object
    /// that fails to apply is recorded and the rest still go through. The
    /// workloads of the targets the snapshot holds are then restarted, the
    /// same set and timeouts the forward rotation used.
    ///
    /// # Errors
    ///
    /// - [`RotorError::SnapshotNotFound`](crate::RotorError::SnapshotNotFound)
    /// - [`RotorError::EmptySnapshot`](crate::RotorError::EmptySnapshot)
    ///
    /// Both are returned before anything is applied or restarted.
    pub async fn run(&self, location: impl AsRef<Path>) -> Result<RollbackReport> {
        let location = location.as_ref();

        tracing::info!(phase = ?RollbackPhase::ValidateSnapshot, location = %location.display());
        let snapshot = BackupSnapshot::open(location).await?;
        let targets = snapshot.contained_targets(&self.config)?;
        let workloads = RotationTarget::dependent_services_of(&targets, &self.config)?;
        tracing::debug!(targets = ?targets, "targets held by snapshot");

        tracing::info!(phase = ?RollbackPhase::Restoring, objects = snapshot.secrets.len());
        let mut restored = Vec::new();
        let mut failed = Vec::new();
        for secret in &snapshot.secrets {
            let applied = match snapshot.read_export(secret).await {
                Ok(document) => self.backends.store.restore(&document).await,
                Err(e) => Err(e),
            };
            match applied {
                Ok(secret) => {
                    tracing::info!(secret = %secret, "secret restored");
                    restored.push(secret);
                }
                Err(e) => {
                    tracing::error!(secret = %secret, error = %e, "could not restore secret");
                    failed.push(format!("{}: {}", secret, e));
                }
            }
        }

        tracing::info!(phase = ?RollbackPhase::Restarting, workloads = workloads.len());
        let mut restarted = Vec::new();
        let mut restart_failures = Vec::new();
        for workload in &workloads {
            match restart_and_wait(
                self.backends.platform.as_ref(),
                workload,
                self.config.poll_interval,
            )
            .await
            {
                Ok(()) => restarted.push(workload.to_string()),
                Err(e) => {
                    tracing::error!(workload = %workload, error = %e, "restart after rollback failed");
                    restart_failures.push(format!("{}: {}", workload, e));
                }
            }
        }

        tracing::info!(phase = ?RollbackPhase::Done, restored = restored.len(), "rollback finished");
        Ok(RollbackReport {
            snapshot,
            restored,
            failed,
            restarted,
            restart_failures,
        })
    }
}
