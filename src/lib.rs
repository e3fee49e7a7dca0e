//! Keyrotor - credential rotation and recovery for Kubernetes-hosted workloads.
//!
//! Keyrotor rotates the credentials of an application stack (database
//! password, admin logins, TLS certificates, cloud access keys, API tokens)
//! the way an operator would by hand, but with every step checked:
//!
//! 1. verify that the cluster is reachable
//! 2. snapshot every secret object about to change
//! 3. rotate each target, restart its dependents and wait for readiness
//! 4. verify pod and endpoint health
//! 5. send a summary to the configured channels
//!
//! A failed target never stops the targets after it. Recovery is a separate,
//! explicit [`rollback`](orchestrator::Orchestrator::rollback) from a snapshot.
//!
//! # Features
//!
//! - **Typed mutations**: secret writes are [`SecretPatch`] / [`SecretManifest`]
//!   values with validated names, never interpolated strings
//! - **Async/Await**: built on tokio
//! - **Secret hygiene**: generated values travel as `SecretString`
//! - **Pluggable backends**: `kubectl` and `aws` CLIs, or an in-memory mock
//!
//! # Quick Start
//!
//! ```
//! use keyrotor::backends::mock::MockCluster;
//! use keyrotor::factory::Backends;
//! use keyrotor::orchestrator::Orchestrator;
//! use keyrotor::{Config, RotationTarget, SecretRef};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> keyrotor::Result<()> {
//!     let backups = tempfile::tempdir()?;
//!     let cluster = Arc::new(MockCluster::new());
//!     cluster
//!         .set_secret(&SecretRef::new("n8n", "n8n-secrets")?, [("N8N_BASIC_AUTH_PASSWORD", "old")])
//!         .await;
//!
//!     let config = Config::new("staging")
//!         .with_backup_root(backups.path())
//!         .with_poll_interval(Duration::from_millis(10));
//!
//!     let orchestrator = Orchestrator::new(Backends::mock(cluster), config);
//!     let run = orchestrator.run(&[RotationTarget::AdminPassword]).await?;
//!
//!     assert!(run.is_success());
//!     println!("{}", run.summary(false));
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! | Backend | Feature Flag | CLI Required | Notes |
//! |---------|-------------|--------------|-------|
//! | Mock | `mock` (default) | None | In-memory cluster with error injection |
//! | kubectl | always | `kubectl` | Secrets, rollouts, cert-manager |
//! | AWS IAM | always | `aws` | Access key rotation |

pub mod backend;
pub mod backends;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod factory;
pub mod generate;
pub mod notify;
pub mod orchestrator;
pub mod outcome;
pub mod poll;
pub mod rollback;
pub mod rotation;
pub mod secret;
pub mod target;
pub mod validation;
pub mod verify;

pub use backend::{AccessKey, CloudIam, Platform, SecretStore};
pub use backup::{BackupSnapshot, BackupWriter};
pub use config::Config;
pub use error::{Result, RotorError};
pub use outcome::{OutcomeStatus, RotationOutcome, RotationRun};
pub use secret::{SecretManifest, SecretPatch, SecretRef};
pub use target::{Certificate, RotationTarget, Workload, WorkloadKind};
