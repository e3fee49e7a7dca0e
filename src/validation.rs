//! Input validation for names passed to external tools.
//!
//! Every namespace, secret name, workload name and data key is checked
//! before it reaches `kubectl` or `aws`, so a malformed name fails the
//! mutation up front instead of producing a half-applied patch.

use crate::{Result, RotorError};

/// Dangerous characters that could enable command injection in shell commands.
const DANGEROUS_CHARS: &str = ";|&$`<>(){}[]!*?~#%^\\\"' ";

/// Maximum length of a Kubernetes object name (DNS-1123 subdomain).
const MAX_NAME_LENGTH: usize = 253;

/// Maximum length of a namespace (DNS-1123 label).
const MAX_NAMESPACE_LENGTH: usize = 63;

/// Validates a Kubernetes object name (secret, namespace, workload).
///
/// Names must be lowercase DNS-1123 subdomains: `[a-z0-9]([-a-z0-9.]*[a-z0-9])?`.
///
/// # Example
///
/// ```
/// use keyrotor::validation::validate_resource_name;
///
/// assert!(validate_resource_name("postgres-secrets").is_ok());
/// assert!(validate_resource_name("n8n").is_ok());
///
/// assert!(validate_resource_name("").is_err());
/// assert!(validate_resource_name("Postgres").is_err());
/// assert!(validate_resource_name("name; rm -rf /").is_err());
/// ```
pub fn validate_resource_name(name: &str) -> Result<()> {
    check_common(name)?;

    if name.len() > MAX_NAME_LENGTH {
        return Err(RotorError::InvalidName(format!(
            "name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(RotorError::InvalidName(format!(
            "{:?} must consist of lowercase alphanumerics, '-' or '.'",
            name
        )));
    }

    let starts_ok = name.starts_with(|c: char| c.is_ascii_alphanumeric());
    let ends_ok = name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err(RotorError::InvalidName(format!(
            "{:?} must start and end with an alphanumeric character",
            name
        )));
    }

    Ok(())
}

/// Validates a namespace.
///
/// Namespaces are DNS-1123 labels: the object-name rules, but without dots
/// and at most 63 characters. Backup exports are named `<ns>.<name>.json`,
/// so the first dot must always separate namespace from name.
///
/// # Example
///
/// ```
/// use keyrotor::validation::validate_namespace;
///
/// assert!(validate_namespace("monitoring").is_ok());
/// assert!(validate_namespace("team.apps").is_err());
/// ```
pub fn validate_namespace(namespace: &str) -> Result<()> {
    validate_resource_name(namespace)?;

    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(RotorError::InvalidName(format!(
            "namespace exceeds maximum length of {} characters",
            MAX_NAMESPACE_LENGTH
        )));
    }

    if namespace.contains('.') {
        return Err(RotorError::InvalidName(format!(
            "namespace {:?} must not contain '.'",
            namespace
        )));
    }

    Ok(())
}

/// Validates a secret data key.
///
/// Kubernetes allows `[-._a-zA-Z0-9]+` for secret keys.
pub fn validate_field_key(key: &str) -> Result<()> {
    check_common(key)?;

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(RotorError::InvalidName(format!(
            "secret key {:?} must consist of alphanumerics, '-', '_' or '.'",
            key
        )));
    }

    Ok(())
}

fn check_common(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RotorError::InvalidName("name cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(RotorError::InvalidName(
            "name contains null byte".to_string(),
        ));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(RotorError::InvalidName(
            "name contains control characters".to_string(),
        ));
    }

    if name.chars().any(|c| DANGEROUS_CHARS.contains(c)) {
        return Err(RotorError::InvalidName(format!(
            "name contains dangerous characters (not allowed: {})",
            DANGEROUS_CHARS
        )));
    }

    Ok(())
}
