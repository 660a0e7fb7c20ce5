//! Native runtime implementation
//!
//! Executes commands directly on the host with a timeout. The child is
//! spawned with `kill_on_drop` so a timed-out command does not linger.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::types::{CommandOutput, CommandRunner, CommandSpec, RuntimeError, RuntimeResult};

/// Runner that executes commands directly on the host
#[derive(Debug, Clone, Default)]
pub struct NativeRunner;

impl NativeRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for NativeRunner {
    fn name(&self) -> &str {
        "native"
    }

    async fn execute(&self, spec: &CommandSpec) -> RuntimeResult<CommandOutput> {
        debug!(command = %spec, timeout = ?spec.timeout, "Running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(spec.timeout, cmd.output())
            .await
            .map_err(|_| RuntimeError::Timeout(spec.timeout))?
            .map_err(|e| RuntimeError::ExecutionFailed(format!("{}: {}", spec.program, e)))?;

        Ok(CommandOutput::new(
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            output.status.code(),
        ))
    }

    async fn is_command_available(&self, program: &str) -> bool {
        Command::new("which")
            .arg(program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_native_runner_name() {
        assert_eq!(NativeRunner::new().name(), "native");
    }

    #[tokio::test]
    async fn test_native_runner_echo() {
        let runner = NativeRunner::new();
        let spec = CommandSpec::new("echo").with_args(["hello"]);

        let output = runner.execute(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_native_runner_with_env() {
        let runner = NativeRunner::new();
        let spec = CommandSpec::new("sh")
            .with_args(["-c", "echo $LEMP_TEST_VAR"])
            .with_env("LEMP_TEST_VAR", "test_value");

        let output = runner.execute(&spec).await.unwrap();
        assert_eq!(output.stdout.trim(), "test_value");
    }

    #[tokio::test]
    async fn test_native_runner_exit_code() {
        let runner = NativeRunner::new();
        let spec = CommandSpec::new("sh").with_args(["-c", "echo oops >&2; exit 42"]);

        let output = runner.execute(&spec).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(42));
        assert_eq!(output.diagnostic(), "oops");
    }

    #[tokio::test]
    async fn test_native_runner_timeout() {
        let runner = NativeRunner::new();
        let spec = CommandSpec::new("sleep")
            .with_args(["10"])
            .with_timeout(Duration::from_millis(200));

        let result = runner.execute(&spec).await;
        assert_eq!(
            result,
            Err(RuntimeError::Timeout(Duration::from_millis(200)))
        );
    }

    #[tokio::test]
    async fn test_native_runner_missing_program() {
        let runner = NativeRunner::new();
        let spec = CommandSpec::new("nonexistent_command_xyz_123");
        let result = runner.execute(&spec).await;
        assert!(matches!(result, Err(RuntimeError::ExecutionFailed(_))));
    }

    #[tokio::test]
    async fn test_is_command_available() {
        let runner = NativeRunner::new();
        assert!(runner.is_command_available("sh").await);
        assert!(!runner.is_command_available("nonexistent_command_xyz_123").await);
    }
}
