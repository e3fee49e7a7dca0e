//! AWS IAM backend.
//!
//! This backend manages access keys for the current IAM user through the
//! `aws` command-line tool.
//!
//! # Requirements
//!
//! - `aws` CLI v2 on `PATH`
//! - Credentials resolvable by the CLI (environment variables, shared
//!   credentials file, or instance profile) that belong to an IAM *user*;
//!   role sessions have no access keys to rotate and resolve to no identity
//!
//! # Example
//!
//! ```no_run
//! use keyrotor::backends::aws::AwsIamBackend;
//! use keyrotor::CloudIam;
//!
//! #[tokio::main]
//! async fn main() -> keyrotor::Result<()> {
//!     let iam = AwsIamBackend::new();
//!
//!     if let Some(user) = iam.current_identity().await? {
//!         let keys = iam.list_access_keys(&user).await?;
//!         println!("{} has {} access keys", user, keys.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

mod backend;

pub use backend::AwsIamBackend;
