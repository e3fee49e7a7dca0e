//! Per-target outcomes and the aggregate run record.
//!
//! [`RotationRun`] is the first-class record of one invocation. It is
//! rendered to the log and to notifications, and serializes to JSON without
//! any generated secret material.

use crate::verify::VerificationReport;
use crate::{BackupSnapshot, RotationTarget};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt::Write as _;

/// Result status of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Rotation completed and dependents are ready
    Succeeded,
    /// An optional capability is absent; nothing was changed
    Skipped {
        /// Why the target was skipped
        reason: String,
    },
    /// A step failed; later targets still ran
    Failed {
        /// Error chain rendered as text
        error: String,
    },
}

/// A newly generated value shown to the operator once.
pub struct RevealedValue {
    /// Label (e.g. "admin password")
    pub label: String,
    /// The value itself
    pub value: SecretString,
}

impl std::fmt::Debug for RevealedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealedValue")
            .field("label", &self.label)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Result of rotating one target.
#[derive(Debug, Serialize)]
pub struct RotationOutcome {
    /// Target that was processed
    pub target: RotationTarget,

    /// What happened
    #[serde(flatten)]
    pub status: OutcomeStatus,

    /// Operator-facing generated values; never serialized
    #[serde(skip)]
    pub revealed: Vec<RevealedValue>,
}

impl RotationOutcome {
    /// Successful outcome without operator-facing values.
    pub fn succeeded(target: RotationTarget) -> Self {
        Self {
            target,
            status: OutcomeStatus::Succeeded,
            revealed: Vec::new(),
        }
    }

    /// Successful outcome carrying values for the operator.
    pub fn succeeded_with(target: RotationTarget, revealed: Vec<RevealedValue>) -> Self {
        Self {
            target,
            status: OutcomeStatus::Succeeded,
            revealed,
        }
    }

    /// Skipped outcome.
    pub fn skipped(target: RotationTarget, reason: impl Into<String>) -> Self {
        Self {
            target,
            status: OutcomeStatus::Skipped {
                reason: reason.into(),
            },
            revealed: Vec::new(),
        }
    }

    /// Failed outcome.
    pub fn failed(target: RotationTarget, error: impl std::fmt::Display) -> Self {
        Self {
            target,
            status: OutcomeStatus::Failed {
                error: error.to_string(),
            },
            revealed: Vec::new(),
        }
    }

    /// True unless the target failed.
    pub fn is_ok(&self) -> bool {
        !matches!(self.status, OutcomeStatus::Failed { .. })
    }

    /// True if the target was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped { .. })
    }

    fn symbol(&self) -> char {
        match self.status {
            OutcomeStatus::Succeeded => '✓',
            OutcomeStatus::Skipped { .. } => '↷',
            OutcomeStatus::Failed { .. } => '✗',
        }
    }
}

/// One end-to-end invocation of the orchestrator.
#[derive(Debug, Serialize)]
pub struct RotationRun {
    /// Run identifier
    pub id: uuid::Uuid,

    /// Environment the run targeted
    pub environment: String,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Snapshot taken before mutation
    pub backup: Option<BackupSnapshot>,

    /// Per-target outcomes in execution order
    pub outcomes: Vec<RotationOutcome>,

    /// Post-rotation verification, if it ran
    pub verification: Option<VerificationReport>,
}

impl RotationRun {
    /// Starts an empty run record.
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            environment: environment.into(),
            started_at: Utc::now(),
            backup: None,
            outcomes: Vec::new(),
            verification: None,
        }
    }

    /// True when verification ran and passed.
    pub fn verification_passed(&self) -> bool {
        self.verification.as_ref().map(|v| v.passed).unwrap_or(false)
    }

    /// True if any target failed.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.is_ok())
    }

    /// True when every target succeeded or skipped and verification passed.
    pub fn is_success(&self) -> bool {
        !self.has_failures() && self.verification.as_ref().map(|v| v.passed).unwrap_or(true)
    }

    /// Outcome for a target, if it ran.
    pub fn outcome(&self, target: RotationTarget) -> Option<&RotationOutcome> {
        self.outcomes.iter().find(|o| o.target == target)
    }

    /// Renders the human-readable summary block.
    ///
    /// With `reveal` set, operator-facing generated values are included; this
    /// is the only place they are ever printed.
    pub fn summary(&self, reveal: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Credential rotation summary ({}, run {})",
            self.environment, self.id
        );
        let _ = writeln!(out, "Started: {}", self.started_at.to_rfc3339());
        if let Some(backup) = &self.backup {
            let _ = writeln!(out, "Backup: {}", backup.location.display());
        }

        for outcome in &self.outcomes {
            let _ = write!(out, "  {} {}", outcome.symbol(), outcome.target);
            match &outcome.status {
                OutcomeStatus::Succeeded => {}
                OutcomeStatus::Skipped { reason } => {
                    let _ = write!(out, " (skipped: {})", reason);
                }
                OutcomeStatus::Failed { error } => {
                    let _ = write!(out, " (failed: {})", error);
                }
            }
            out.push('\n');

            if reveal {
                for value in &outcome.revealed {
                    let _ = writeln!(out, "      {}: {}", value.label, value.value.expose_secret());
                }
            }
        }

        match &self.verification {
            Some(report) if report.passed => {
                let _ = writeln!(out, "Verification: ✓ passed");
            }
            Some(report) => {
                let _ = writeln!(out, "Verification: ✗ failed");
                for failure in &report.failures {
                    let _ = writeln!(out, "  - {}", failure);
                }
            }
            None => {
                let _ = writeln!(out, "Verification: not run");
            }
        }

        if !self.is_success() {
            if let Some(backup) = &self.backup {
                let _ = writeln!(
                    out,
                    "To roll back: keyrotor rollback {}",
                    backup.location.display()
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_run() -> RotationRun {
        let mut run = RotationRun::new("staging");
        run.outcomes.push(RotationOutcome::succeeded_with(
            RotationTarget::AdminPassword,
            vec![RevealedValue {
                label: "admin password".to_string(),
                value: SecretString::from("hunter2hunter2"),
            }],
        ));
        run.outcomes.push(RotationOutcome::skipped(
            RotationTarget::TlsCertificates,
            "no certificate issuer installed",
        ));
        run.outcomes.push(RotationOutcome::failed(
            RotationTarget::MonitoringPassword,
            "timed out",
        ));
        run
    }

    #[test]
    fn test_summary_symbols() {
        let summary = sample_run().summary(false);
        assert!(summary.contains("✓ admin-password"));
        assert!(summary.contains("↷ tls-certificates (skipped: no certificate issuer installed)"));
        assert!(summary.contains("✗ monitoring-password (failed: timed out)"));
        assert!(summary.contains("Verification: not run"));
    }

    #[test]
    fn test_summary_reveal() {
        let run = sample_run();
        assert!(!run.summary(false).contains("hunter2hunter2"));
        assert!(run.summary(true).contains("admin password: hunter2hunter2"));
    }

    #[test]
    fn test_json_never_contains_secrets() {
        let json = serde_json::to_string(&sample_run()).unwrap();
        assert!(!json.contains("hunter2hunter2"));
        assert!(json.contains("\"status\":\"skipped\""));
        assert!(json.contains("\"target\":\"admin-password\""));
    }

    #[test]
    fn test_debug_never_contains_secrets() {
        let debug = format!("{:?}", sample_run());
        assert!(!debug.contains("hunter2hunter2"));
    }

    #[test]
    fn test_success_flags() {
        let run = sample_run();
        assert!(run.has_failures());
        assert!(!run.is_success());
        assert!(run.outcome(RotationTarget::TlsCertificates).unwrap().is_skipped());

        let mut clean = RotationRun::new("prod");
        clean.outcomes.push(RotationOutcome::succeeded(RotationTarget::ApiTokens));
        assert!(clean.is_success());
        assert!(!clean.verification_passed());
    }
}
