//! Secret backup writer and snapshot reader.
//!
//! A snapshot is a directory `<backup-root>/<UTC %Y%m%d_%H%M%S>/` holding one
//! `<namespace>.<name>.json` export per captured secret object and nothing
//! else. Snapshots are never deleted automatically; they are the only source
//! for rollback.
//!
//! # Security
//!
//! - Snapshot directories are created with mode 0700 on Unix
//! - Export files are written with mode 0600 on Unix

use crate::{Config, Result, RotationTarget, RotorError, SecretRef, SecretStore};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Directory name format for snapshots.
pub const SNAPSHOT_FORMAT: &str = "%Y%m%d_%H%M%S";

const EXPORT_EXTENSION: &str = "json";

/// A point-in-time capture of secret objects.
#[derive(Debug, Clone, Serialize)]
pub struct BackupSnapshot {
    /// Snapshot identifier (directory name)
    pub id: String,

    /// Snapshot directory
    pub location: PathBuf,

    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,

    /// Environment the snapshot was taken for; unknown for snapshots read back from disk
    pub environment: Option<String>,

    /// Secret objects actually captured
    pub secrets: Vec<SecretRef>,
}

impl BackupSnapshot {
    /// Opens an existing snapshot directory for rollback.
    ///
    /// # Errors
    ///
    /// - [`RotorError::SnapshotNotFound`]: the path does not exist or is not a directory
    /// - [`RotorError::EmptySnapshot`]: the directory holds no recognizable exports
    pub async fn open(location: impl AsRef<Path>) -> Result<Self> {
        let location = location.as_ref().to_path_buf();

        let metadata = match fs::metadata(&location).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RotorError::SnapshotNotFound(location.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(RotorError::SnapshotNotFound(location.display().to_string()));
        }

        let mut secrets = Vec::new();
        let mut entries = fs::read_dir(&location).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(secret) = parse_export_name(&entry.path()) {
                secrets.push(secret);
            }
        }
        secrets.sort();

        if secrets.is_empty() {
            return Err(RotorError::EmptySnapshot(location.display().to_string()));
        }

        let id = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let created_at = match parse_snapshot_id(&id) {
            Some(ts) => ts,
            None => metadata.modified().map(DateTime::<Utc>::from)?,
        };

        Ok(Self {
            id,
            location,
            created_at,
            environment: None,
            secrets,
        })
    }

    /// Path of the export file for `secret`.
    pub fn export_path(&self, secret: &SecretRef) -> PathBuf {
        self.location.join(secret.export_file_name())
    }

    /// Reads the exported document for `secret`.
    pub async fn read_export(&self, secret: &SecretRef) -> Result<String> {
        Ok(fs::read_to_string(self.export_path(secret)).await?)
    }

    /// Targets whose writes this snapshot can undo, in run order.
    ///
    /// A target counts when every object it writes was captured. An object
    /// not covered that way (a partial capture) pulls in every target that
    /// writes it.
    pub fn contained_targets(&self, config: &Config) -> Result<Vec<RotationTarget>> {
        let mut owned = Vec::new();
        for target in RotationTarget::ALL {
            owned.push((target, target.backup_secrets(config)?));
        }

        let mut contained: Vec<RotationTarget> = owned
            .iter()
            .filter(|(_, secrets)| {
                !secrets.is_empty() && secrets.iter().all(|s| self.secrets.contains(s))
            })
            .map(|(target, _)| *target)
            .collect();

        for secret in &self.secrets {
            let covered = owned
                .iter()
                .any(|(target, secrets)| contained.contains(target) && secrets.contains(secret));
            if covered {
                continue;
            }
            for (target, secrets) in &owned {
                if secrets.contains(secret) && !contained.contains(target) {
                    contained.push(*target);
                }
            }
        }

        contained.sort_by_key(|t| RotationTarget::ALL.iter().position(|x| x == t));
        Ok(contained)
    }
}

/// Writes snapshots under a root directory.
#[derive(Debug, Clone)]
pub struct BackupWriter {
    root: PathBuf,
}

impl BackupWriter {
    /// Creates a writer rooted at `root`. Nothing is touched until [`snapshot`](Self::snapshot).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a new snapshot and exports each of `secrets` into it.
    ///
    /// Each export is independent: a missing or unreadable object is logged
    /// as a warning and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RotorError::BackupFailed`] when the snapshot directory cannot
    /// be created or when not a single object could be captured.
    pub async fn snapshot(
        &self,
        store: &dyn SecretStore,
        environment: &str,
        secrets: &[SecretRef],
    ) -> Result<BackupSnapshot> {
        let created_at = Utc::now();
        let (id, location) = self
            .create_snapshot_dir(&created_at)
            .await
            .map_err(|e| RotorError::BackupFailed(format!("cannot create snapshot directory: {}", e)))?;

        tracing::info!(location = %location.display(), "backing up secrets");

        let mut captured = Vec::new();
        for secret in secrets {
            match self.export_one(store, &location, secret).await {
                Ok(()) => {
                    tracing::info!(secret = %secret, "secret backed up");
                    captured.push(secret.clone());
                }
                Err(e) => {
                    tracing::warn!(secret = %secret, error = %e, "could not back up secret; continuing");
                }
            }
        }

        if captured.is_empty() {
            return Err(RotorError::BackupFailed(format!(
                "no secret objects could be exported into {}",
                location.display()
            )));
        }

        Ok(BackupSnapshot {
            id,
            location,
            created_at,
            environment: Some(environment.to_string()),
            secrets: captured,
        })
    }

    async fn create_snapshot_dir(&self, created_at: &DateTime<Utc>) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.root).await?;

        let base = created_at.format(SNAPSHOT_FORMAT).to_string();
        let mut suffix = 0u32;
        loop {
            let id = if suffix == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, suffix)
            };
            let location = self.root.join(&id);

            match fs::create_dir(&location).await {
                Ok(()) => {
                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        let mut perms = fs::metadata(&location).await?.permissions();
                        perms.set_mode(0o700);
                        fs::set_permissions(&location, perms).await?;
                    }
                    return Ok((id, location));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn export_one(
        &self,
        store: &dyn SecretStore,
        location: &Path,
        secret: &SecretRef,
    ) -> Result<()> {
        let document = store.export(secret).await?;
        let path = location.join(secret.export_file_name());

        let mut file = fs::File::create(&path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata().await?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&path, perms).await?;
        }

        file.write_all(document.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Lists snapshots under the root, newest first.
    ///
    /// Directories without recognizable exports are left out. A missing root
    /// yields an empty list.
    pub async fn list(&self) -> Result<Vec<BackupSnapshot>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match BackupSnapshot::open(entry.path()).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(RotorError::EmptySnapshot(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(snapshots)
    }
}

/// Parses `<namespace>.<name>.json` back into a secret reference.
fn parse_export_name(path: &Path) -> Option<SecretRef> {
    if path.extension()?.to_str()? != EXPORT_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (namespace, name) = stem.split_once('.')?;
    SecretRef::new(namespace, name).ok()
}

fn parse_snapshot_id(id: &str) -> Option<DateTime<Utc>> {
    let stamp = id.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, SNAPSHOT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_export_name() {
        let secret = parse_export_name(Path::new("/b/n8n.postgres-secrets.json")).unwrap();
        assert_eq!(secret.to_string(), "n8n/postgres-secrets");

        assert!(parse_export_name(Path::new("/b/notes.txt")).is_none());
        assert!(parse_export_name(Path::new("/b/nonamespace.json")).is_none());
    }

    #[test]
    fn test_parse_snapshot_id() {
        let ts = parse_snapshot_id("20240131_235959").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-31T23:59:59+00:00");

        assert!(parse_snapshot_id("20240131_235959-2").is_some());
        assert!(parse_snapshot_id("latest").is_none());
    }

    #[tokio::test]
    async fn test_open_missing_snapshot() {
        let dir = tempdir().unwrap();
        let result = BackupSnapshot::open(dir.path().join("nope")).await;
        assert!(matches!(result, Err(RotorError::SnapshotNotFound(_))));
    }

    #[tokio::test]
    async fn test_open_empty_snapshot() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("README"), "not an export").unwrap();

        let result = BackupSnapshot::open(dir.path()).await;
        assert!(matches!(result, Err(RotorError::EmptySnapshot(_))));
    }

    #[tokio::test]
    async fn test_open_lists_exports() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("n8n.n8n-secrets.json"), "{}").unwrap();
        std::fs::write(dir.path().join("monitoring.grafana-admin.json"), "{}").unwrap();

        let snapshot = BackupSnapshot::open(dir.path()).await.unwrap();
        let names: Vec<String> = snapshot.secrets.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["monitoring/grafana-admin", "n8n/n8n-secrets"]);
        assert_eq!(
            snapshot.contained_targets(&Config::default()).unwrap(),
            vec![
                RotationTarget::AdminPassword,
                RotationTarget::MonitoringPassword
            ]
        );
    }

    #[tokio::test]
    async fn test_contained_targets_full_and_partial_capture() {
        let config = Config::default();

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("n8n.postgres-secrets.json"), "{}").unwrap();
        std::fs::write(dir.path().join("n8n.n8n-secrets.json"), "{}").unwrap();
        let snapshot = BackupSnapshot::open(dir.path()).await.unwrap();
        assert_eq!(
            snapshot.contained_targets(&config).unwrap(),
            vec![RotationTarget::DatabasePassword, RotationTarget::AdminPassword]
        );

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("n8n.postgres-secrets.json"), "{}").unwrap();
        let snapshot = BackupSnapshot::open(dir.path()).await.unwrap();
        assert_eq!(
            snapshot.contained_targets(&config).unwrap(),
            vec![RotationTarget::DatabasePassword]
        );

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("other.unrelated.json"), "{}").unwrap();
        let snapshot = BackupSnapshot::open(dir.path()).await.unwrap();
        assert!(snapshot.contained_targets(&config).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_missing_root() {
        let dir = tempdir().unwrap();
        let writer = BackupWriter::new(dir.path().join("absent"));
        assert!(writer.list().await.unwrap().is_empty());
    }
}
