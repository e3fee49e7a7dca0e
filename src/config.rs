//! Configuration for a rotation or recovery run.
//!
//! Everything the orchestrator needs is carried in an explicit [`Config`]
//! value built once at startup; nothing is read from the process environment
//! after construction.

use std::path::PathBuf;
use std::time::Duration;

/// Default environment name when `ENVIRONMENT` is unset.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Configuration for the orchestrator.
///
/// Use the builder pattern for ergonomic configuration:
///
/// ```
/// use keyrotor::Config;
/// use std::time::Duration;
///
/// let config = Config::new("staging")
///     .with_namespace("n8n-staging")
///     .with_backup_root("/var/backups/secrets")
///     .with_health_endpoint("https://n8n.example.com/healthz")
///     .with_poll_interval(Duration::from_secs(2));
///
/// assert_eq!(config.environment, "staging");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment (production, staging, ...)
    pub environment: String,

    /// Namespace holding the application and database secrets (default: "n8n")
    pub namespace: String,

    /// Namespace holding the monitoring stack (default: "monitoring")
    pub monitoring_namespace: String,

    /// Root directory under which timestamped snapshots are written
    pub backup_root: PathBuf,

    /// Chat webhook that receives the run summary
    pub slack_webhook_url: Option<String>,

    /// Address that receives the run summary by email
    pub notification_email: Option<String>,

    /// HTTP endpoints probed during verification
    pub health_endpoints: Vec<String>,

    /// Readiness timeout for stateful workloads (default: 300s)
    pub stateful_timeout: Duration,

    /// Readiness timeout for the primary application (default: 600s)
    pub application_timeout: Duration,

    /// Readiness timeout for reissued certificates (default: 300s)
    pub certificate_timeout: Duration,

    /// Wait between creating a new cloud key and revoking old ones (default: 60s)
    pub iam_grace_period: Duration,

    /// Interval between readiness probes (default: 5s)
    pub poll_interval: Duration,

    /// Generated password length (default: 32)
    pub password_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            namespace: "n8n".to_string(),
            monitoring_namespace: "monitoring".to_string(),
            backup_root: PathBuf::from("secret-backups"),
            slack_webhook_url: None,
            notification_email: None,
            health_endpoints: Vec::new(),
            stateful_timeout: Duration::from_secs(300),
            application_timeout: Duration::from_secs(600),
            certificate_timeout: Duration::from_secs(300),
            iam_grace_period: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            password_length: 32,
        }
    }
}

impl Config {
    /// Creates a configuration for the given environment with defaults.
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            ..Default::default()
        }
    }

    /// Builds a configuration from process environment variables.
    ///
    /// Recognised variables: `ENVIRONMENT`, `ROTATION_NAMESPACE`,
    /// `MONITORING_NAMESPACE`, `SECRET_BACKUP_ROOT`, `SLACK_WEBHOOK_URL`,
    /// `NOTIFICATION_EMAIL`, `HEALTH_ENDPOINTS` (comma-separated).
    /// Empty values are treated as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(get("ENVIRONMENT").unwrap_or_else(|| DEFAULT_ENVIRONMENT.into()));

        if let Some(ns) = get("ROTATION_NAMESPACE") {
            config.namespace = ns;
        }
        if let Some(ns) = get("MONITORING_NAMESPACE") {
            config.monitoring_namespace = ns;
        }
        if let Some(root) = get("SECRET_BACKUP_ROOT") {
            config.backup_root = PathBuf::from(root);
        }
        config.slack_webhook_url = get("SLACK_WEBHOOK_URL");
        config.notification_email = get("NOTIFICATION_EMAIL");
        if let Some(endpoints) = get("HEALTH_ENDPOINTS") {
            config.health_endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        config
    }

    /// Sets the application namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the monitoring namespace.
    pub fn with_monitoring_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.monitoring_namespace = namespace.into();
        self
    }

    /// Sets the snapshot root directory.
    pub fn with_backup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.backup_root = root.into();
        self
    }

    /// Sets the chat webhook URL.
    pub fn with_slack_webhook(mut self, url: impl Into<String>) -> Self {
        self.slack_webhook_url = Some(url.into());
        self
    }

    /// Sets the notification email address.
    pub fn with_notification_email(mut self, address: impl Into<String>) -> Self {
        self.notification_email = Some(address.into());
        self
    }

    /// Adds a health endpoint probed during verification.
    pub fn with_health_endpoint(mut self, url: impl Into<String>) -> Self {
        self.health_endpoints.push(url.into());
        self
    }

    /// Overrides both readiness timeouts.
    ///
    /// Mostly useful in tests; production keeps the slower application timeout.
    pub fn with_timeouts(mut self, stateful: Duration, application: Duration) -> Self {
        self.stateful_timeout = stateful;
        self.application_timeout = application;
        self
    }

    /// Sets the certificate readiness timeout.
    pub fn with_certificate_timeout(mut self, timeout: Duration) -> Self {
        self.certificate_timeout = timeout;
        self
    }

    /// Sets the cloud key grace period.
    pub fn with_iam_grace_period(mut self, grace: Duration) -> Self {
        self.iam_grace_period = grace;
        self
    }

    /// Sets the readiness poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the generated password length.
    pub fn with_password_length(mut self, length: usize) -> Self {
        self.password_length = length;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.environment, "production");
        assert_eq!(config.namespace, "n8n");
        assert_eq!(config.stateful_timeout, Duration::from_secs(300));
        assert_eq!(config.application_timeout, Duration::from_secs(600));
        assert_eq!(config.iam_grace_period, Duration::from_secs(60));
        assert_eq!(config.backup_root, PathBuf::from("secret-backups"));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new("staging")
            .with_namespace("apps")
            .with_slack_webhook("https://hooks.example.com/x")
            .with_health_endpoint("http://localhost/healthz")
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(2));

        assert_eq!(config.environment, "staging");
        assert_eq!(config.namespace, "apps");
        assert_eq!(
            config.slack_webhook_url.as_deref(),
            Some("https://hooks.example.com/x")
        );
        assert_eq!(config.health_endpoints.len(), 1);
        assert_eq!(config.application_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("ENVIRONMENT", "staging"),
            ("SLACK_WEBHOOK_URL", ""),
            ("NOTIFICATION_EMAIL", "ops@example.com"),
            ("HEALTH_ENDPOINTS", "http://a/healthz, ,http://b/healthz"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.environment, "staging");
        assert_eq!(config.slack_webhook_url, None);
        assert_eq!(config.notification_email.as_deref(), Some("ops@example.com"));
        assert_eq!(
            config.health_endpoints,
            vec!["http://a/healthz".to_string(), "http://b/healthz".to_string()]
        );
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.environment, DEFAULT_ENVIRONMENT);
        assert_eq!(config.monitoring_namespace, "monitoring");
    }
}
