//! AWS IAM backend implementation.

use crate::cli::{check_command_exists, run_command};
use crate::{AccessKey, CloudIam, Result, RotorError};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

/// AWS IAM backend driven through the `aws` CLI.
pub struct AwsIamBackend {
    profile: Option<String>,
}

impl AwsIamBackend {
    /// Creates a backend using the CLI's default credential chain.
    pub fn new() -> Self {
        Self { profile: None }
    }

    /// Uses a named CLI profile for every call.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    async fn aws(&self, args: &[&str]) -> Result<String> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend_from_slice(&["--output", "json"]);
        if let Some(ref profile) = self.profile {
            full.extend_from_slice(&["--profile", profile.as_str()]);
        }
        run_command("aws", &full, &[]).await
    }
}

impl Default for AwsIamBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `aws sts get-caller-identity` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    arn: String,
}

/// `aws iam create-access-key` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateAccessKeyResponse {
    access_key: CreatedKey,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedKey {
    access_key_id: String,
    secret_access_key: String,
}

/// `aws iam list-access-keys` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAccessKeysResponse {
    access_key_metadata: Vec<KeyMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyMetadata {
    access_key_id: String,
}

/// Extracts the IAM user name from a caller ARN.
///
/// Returns `None` for anything that is not `arn:aws:iam::<acct>:user/<path/>name`.
fn user_from_arn(arn: &str) -> Option<String> {
    let resource = arn.splitn(6, ':').nth(5)?;
    let path = resource.strip_prefix("user/")?;
    path.rsplit('/').next().filter(|n| !n.is_empty()).map(String::from)
}

#[async_trait]
impl CloudIam for AwsIamBackend {
    fn name(&self) -> &str {
        "aws"
    }

    async fn current_identity(&self) -> Result<Option<String>> {
        if !check_command_exists("aws").await? {
            tracing::debug!("aws CLI not installed");
            return Ok(None);
        }

        let output = match self.aws(&["sts", "get-caller-identity"]).await {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(error = %e, "aws identity could not be resolved");
                return Ok(None);
            }
        };

        let identity: CallerIdentity = serde_json::from_str(&output).map_err(|e| {
            RotorError::Other(anyhow::anyhow!("Failed to parse caller identity: {}", e))
        })?;

        let user = user_from_arn(&identity.arn);
        if user.is_none() {
            tracing::warn!(arn = %identity.arn, "caller is not an IAM user; no access keys to rotate");
        }
        Ok(user)
    }

    async fn create_access_key(&self, user: &str) -> Result<AccessKey> {
        let output = self
            .aws(&["iam", "create-access-key", "--user-name", user])
            .await?;
        let response: CreateAccessKeyResponse = serde_json::from_str(&output)?;

        Ok(AccessKey {
            id: response.access_key.access_key_id,
            secret: SecretString::from(response.access_key.secret_access_key),
        })
    }

    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>> {
        let output = self
            .aws(&["iam", "list-access-keys", "--user-name", user])
            .await?;
        let response: ListAccessKeysResponse = serde_json::from_str(&output)?;

        Ok(response
            .access_key_metadata
            .into_iter()
            .map(|k| k.access_key_id)
            .collect())
    }

    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<()> {
        self.aws(&[
            "iam",
            "delete-access-key",
            "--user-name",
            user,
            "--access-key-id",
            key_id,
        ])
        .await?;
        Ok(())
    }
}
