//! Kubernetes backend.
//!
//! This backend drives the cluster through the `kubectl` command-line tool.
//! It implements both [`SecretStore`](crate::SecretStore) and
//! [`Platform`](crate::Platform).
//!
//! # Requirements
//!
//! - `kubectl` on `PATH`
//! - A kubeconfig context with access to the target namespaces
//! - cert-manager (optional; certificate rotation is skipped without it)
//!
//! # Features
//!
//! - Field-level merge patches; untouched fields are preserved
//! - Secret material is passed on stdin, never on the command line
//! - Exports are stripped of server-managed metadata so they re-apply cleanly
//!
//! # Example
//!
//! ```no_run
//! use keyrotor::backends::kubectl::KubectlBackend;
//! use keyrotor::{Platform, SecretRef, SecretStore};
//!
//! #[tokio::main]
//! async fn main() -> keyrotor::Result<()> {
//!     let kubectl = KubectlBackend::new();
//!     kubectl.preflight().await?;
//!
//!     let secret = SecretRef::new("n8n", "postgres-secrets")?;
//!     let document = kubectl.export(&secret).await?;
//!     println!("{}", document);
//!
//!     Ok(())
//! }
//! ```

mod backend;
mod resources;

pub use backend::KubectlBackend;
