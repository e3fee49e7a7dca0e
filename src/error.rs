//! Error types for rotation and recovery operations.

use thiserror::Error;

/// Result type alias using [`RotorError`].
pub type Result<T> = std::result::Result<T, RotorError>;

/// Errors that can occur while rotating or restoring credentials.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum RotorError {
    /// A prerequisite (tool, cluster access, environment) is missing.
    #[error("prerequisite check failed: {0}")]
    PrerequisiteMissing(String),

    /// Required CLI tool is not installed.
    #[error("required CLI not installed: {0}")]
    ToolNotInstalled(String),

    /// Object was not found in the external store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource or field name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A bounded wait expired before the condition held.
    #[error("timed out after {attempts} attempts waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Number of probes performed
        attempts: u32,
    },

    /// The backup writer could not capture anything.
    #[error("backup failed: {0}")]
    BackupFailed(String),

    /// Rollback was given a snapshot location that does not exist.
    #[error("backup snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Rollback was given a snapshot location without secret exports.
    #[error("backup snapshot contains no secret exports: {0}")]
    EmptySnapshot(String),

    /// A notification channel failed to deliver.
    #[error("notification via {channel} failed: {reason}")]
    Notification {
        /// Channel name (slack, email)
        channel: String,
        /// Delivery failure description
        reason: String,
    },

    /// Rotation operation failed with context.
    #[error("{target}: {operation}: {source}")]
    TargetOperation {
        /// Rotation target name
        target: String,
        /// Operation step (generate, patch, restart, ...)
        operation: String,
        /// Underlying error
        #[source]
        source: Box<RotorError>,
    },

    /// HTTP error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Command execution failed. Carries the tool's raw diagnostic output.
    #[error("command execution failed: {0}")]
    CommandFailed(String),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RotorError {
    /// Wraps an error with the rotation target and step that produced it.
    ///
    /// # Example
    ///
    /// ```
    /// use keyrotor::RotorError;
    ///
    /// let err = RotorError::NotFound("postgres-secrets".to_string());
    /// let wrapped = RotorError::target_op("database-password", "patch", err);
    ///
    /// assert_eq!(
    ///     wrapped.to_string(),
    ///     "database-password: patch: not found: postgres-secrets"
    /// );
    /// ```
    pub fn target_op(
        target: impl Into<String>,
        operation: impl Into<String>,
        err: RotorError,
    ) -> Self {
        Self::TargetOperation {
            target: target.into(),
            operation: operation.into(),
            source: Box::new(err),
        }
    }

    /// Returns true for errors that mean the external tool is unusable.
    pub fn is_prerequisite(&self) -> bool {
        matches!(
            self,
            Self::PrerequisiteMissing(_) | Self::ToolNotInstalled(_)
        )
    }
}
