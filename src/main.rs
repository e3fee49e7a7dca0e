// Command-line entry point for credential rotation and recovery

use anyhow::Context;
use clap::{Parser, Subcommand};
use keyrotor::factory::{new_backends, BackendKind, BackendOptions};
use keyrotor::orchestrator::{
    exit_code_for_error, Orchestrator, EXIT_FAILURES, EXIT_OK, EXIT_PREREQUISITE,
};
use keyrotor::{Config, RotationTarget, RotorError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keyrotor")]
#[command(about = "Rotate, verify and roll back stack credentials", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Deployment environment name
    #[arg(long, global = true, env = "ENVIRONMENT", default_value = keyrotor::config::DEFAULT_ENVIRONMENT)]
    environment: String,

    /// Namespace holding the application and database secrets
    #[arg(long, global = true, env = "ROTATION_NAMESPACE")]
    namespace: Option<String>,

    /// Namespace holding the monitoring stack
    #[arg(long, global = true, env = "MONITORING_NAMESPACE")]
    monitoring_namespace: Option<String>,

    /// Directory under which backup snapshots are written
    #[arg(long, global = true, env = "SECRET_BACKUP_ROOT")]
    backup_root: Option<PathBuf>,

    /// Chat webhook receiving the run summary
    #[arg(long, global = true, env = "SLACK_WEBHOOK_URL")]
    slack_webhook_url: Option<String>,

    /// Email address receiving the run summary
    #[arg(long, global = true, env = "NOTIFICATION_EMAIL")]
    notification_email: Option<String>,

    /// Health endpoint probed during verification (repeatable)
    #[arg(long = "health-endpoint", global = true, env = "HEALTH_ENDPOINTS", value_delimiter = ',')]
    health_endpoints: Vec<String>,

    /// Backend driving the run (kubectl, mock)
    #[arg(long, global = true, default_value = "kubectl")]
    backend: BackendKind,

    /// kubeconfig context to use
    #[arg(long, global = true)]
    kube_context: Option<String>,

    /// AWS CLI profile to use
    #[arg(long, global = true)]
    aws_profile: Option<String>,

    /// Print the result as JSON on stdout (generated values are never included)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rotate every credential in order
    Full,
    /// Rotate the database password
    Postgres,
    /// Rotate the application admin password
    N8n,
    /// Rotate the monitoring admin password
    Grafana,
    /// Renew TLS certificates
    Ssl,
    /// Rotate cloud access keys
    Aws,
    /// Regenerate API tokens
    Api,
    /// Check pod and endpoint health without rotating
    Verify,
    /// Restore secrets from a backup snapshot
    Rollback {
        /// Snapshot directory (see `keyrotor backups`)
        backup_dir: Option<PathBuf>,
    },
    /// List backup snapshots, newest first
    Backups,
}

impl Commands {
    fn target(&self) -> Option<RotationTarget> {
        match self {
            Commands::Postgres => Some(RotationTarget::DatabasePassword),
            Commands::N8n => Some(RotationTarget::AdminPassword),
            Commands::Grafana => Some(RotationTarget::MonitoringPassword),
            Commands::Ssl => Some(RotationTarget::TlsCertificates),
            Commands::Aws => Some(RotationTarget::CloudAccessKeys),
            Commands::Api => Some(RotationTarget::ApiTokens),
            _ => None,
        }
    }
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::new(self.environment.clone());
        if let Some(ref ns) = self.namespace {
            config = config.with_namespace(ns.clone());
        }
        if let Some(ref ns) = self.monitoring_namespace {
            config = config.with_monitoring_namespace(ns.clone());
        }
        if let Some(ref root) = self.backup_root {
            config = config.with_backup_root(root.clone());
        }
        if let Some(ref url) = self.slack_webhook_url {
            config = config.with_slack_webhook(url.clone());
        }
        if let Some(ref address) = self.notification_email {
            config = config.with_notification_email(address.clone());
        }
        for endpoint in self.health_endpoints.iter().filter(|e| !e.trim().is_empty()) {
            config = config.with_health_endpoint(endpoint.trim());
        }
        config
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.config();
    let options = BackendOptions {
        kube_context: cli.kube_context.clone(),
        aws_profile: cli.aws_profile.clone(),
    };
    let backends = new_backends(cli.backend, &options);
    tracing::debug!(backends = ?backends, environment = %config.environment, "starting");

    let orchestrator = Orchestrator::new(backends, config);

    let targets: Vec<RotationTarget> = match (&cli.command, cli.command.target()) {
        (Commands::Full, _) => RotationTarget::ALL.to_vec(),
        (_, Some(target)) => vec![target],
        _ => Vec::new(),
    };

    match cli.command {
        Commands::Verify => {
            let report = orchestrator.verify().await?;
            if cli.json {
                print_json(&report)?;
            }
            Ok(if report.passed { EXIT_OK } else { EXIT_FAILURES })
        }
        Commands::Rollback { backup_dir } => {
            let Some(backup_dir) = backup_dir else {
                tracing::error!("rollback requires a backup directory; run `keyrotor backups` to list them");
                return Ok(EXIT_PREREQUISITE);
            };
            let report = orchestrator.rollback(&backup_dir).await?;
            if cli.json {
                print_json(&report)?;
            }
            Ok(if report.is_success() { EXIT_OK } else { EXIT_FAILURES })
        }
        Commands::Backups => {
            let snapshots = orchestrator.backups().await?;
            if cli.json {
                print_json(&snapshots)?;
            } else if snapshots.is_empty() {
                println!(
                    "No backups under {}",
                    orchestrator.config().backup_root.display()
                );
            } else {
                for snapshot in &snapshots {
                    let secrets: Vec<String> =
                        snapshot.secrets.iter().map(|s| s.to_string()).collect();
                    println!(
                        "{}  {}  {}",
                        snapshot.location.display(),
                        snapshot.created_at.to_rfc3339(),
                        secrets.join(", ")
                    );
                }
            }
            Ok(EXIT_OK)
        }
        _ => {
            let run = orchestrator.run(&targets).await?;
            if cli.json {
                print_json(&run)?;
            }
            Ok(if run.is_success() { EXIT_OK } else { EXIT_FAILURES })
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!("{:#}", e);
            let code = e
                .downcast_ref::<RotorError>()
                .map(exit_code_for_error)
                .unwrap_or(EXIT_FAILURES);
            ExitCode::from(code as u8)
        }
    }
}
