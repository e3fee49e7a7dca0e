//! Common utilities for CLI-based backends.
//!
//! Every external tool (`kubectl`, `aws`, `mail`) is invoked through these
//! helpers so that failures carry the tool's raw stderr unchanged.

use crate::{Result, RotorError};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Executes a command and returns stdout as a string.
///
/// # Errors
///
/// - [`RotorError::ToolNotInstalled`] if the program is not on `PATH`
/// - [`RotorError::CommandFailed`] if the exit code is non-zero; the message
///   includes the exit code and the untouched stderr
pub async fn run_command(program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    for (key, value) in env {
        cmd.env(key, value);
    }

    tracing::debug!(program, ?args, "running command");

    let output = cmd.output().await.map_err(|e| spawn_error(program, e))?;
    check_output(program, output)
}

/// Executes a command with stdin input.
///
/// Used for `kubectl apply -f -` and for piping notification bodies into
/// `mail`, so that secret material never appears in the process arguments.
pub async fn run_command_with_stdin(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    stdin_data: &str,
) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    for (key, value) in env {
        cmd.env(key, value);
    }

    tracing::debug!(program, ?args, "running command with stdin");

    let mut child = cmd.spawn().map_err(|e| spawn_error(program, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(stdin_data.as_bytes())
            .await
            .map_err(RotorError::Io)?;
        stdin.flush().await.map_err(RotorError::Io)?;
    }

    let output = child.wait_with_output().await.map_err(RotorError::Io)?;
    check_output(program, output)
}

/// Checks if a command-line tool is available in PATH.
///
/// # Example
///
/// ```no_run
/// use keyrotor::cli::check_command_exists;
///
/// #[tokio::main]
/// async fn main() -> keyrotor::Result<()> {
///     if !check_command_exists("kubectl").await? {
///         println!("kubectl is not installed");
///     }
///     Ok(())
/// }
/// ```
pub async fn check_command_exists(program: &str) -> Result<bool> {
    let output = Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(RotorError::Io)?;

    Ok(output.success())
}

fn spawn_error(program: &str, e: std::io::Error) -> RotorError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RotorError::ToolNotInstalled(format!("{} command not found", program))
    } else {
        RotorError::Io(e)
    }
}

fn check_output(program: &str, output: std::process::Output) -> Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RotorError::CommandFailed(format!(
            "{} failed with exit code {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            stderr.trim_end()
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| {
        RotorError::Other(anyhow::anyhow!("Invalid UTF-8 in command output: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_success() {
        let output = run_command("echo", &["hello"], &[]).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_command_not_found() {
        let result = run_command("nonexistent-command-12345", &[], &[]).await;
        assert!(matches!(result, Err(RotorError::ToolNotInstalled(_))));
    }

    #[tokio::test]
    async fn test_run_command_failure_keeps_stderr() {
        let result = run_command("sh", &["-c", "echo boom >&2; exit 3"], &[]).await;
        match result {
            Err(RotorError::CommandFailed(msg)) => {
                assert!(msg.contains("exit code 3"));
                assert!(msg.contains("boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_command_with_env() {
        let output = run_command("printenv", &["TEST_VAR"], &[("TEST_VAR", "test-value")])
            .await
            .unwrap();
        assert_eq!(output.trim(), "test-value");
    }

    #[tokio::test]
    async fn test_run_command_with_stdin() {
        let output = run_command_with_stdin("cat", &[], &[], "hello from stdin")
            .await
            .unwrap();
        assert_eq!(output.trim(), "hello from stdin");
    }

    #[tokio::test]
    async fn test_check_command_exists() {
        assert!(check_command_exists("echo").await.unwrap());
        assert!(!check_command_exists("nonexistent-command-12345")
            .await
            .unwrap());
    }
}
