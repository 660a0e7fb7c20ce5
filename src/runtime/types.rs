//! Command runtime types.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for a single external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while running an external command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The command did not exit within its timeout and was killed.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The command could not be spawned or waited on.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// An external command to run.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Append arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from a whitespace-split command line (`nginx -t -c /etc/nginx/nginx.conf`).
    ///
    /// Returns `None` for an empty line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Exit code zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Trimmed stderr, falling back to stdout, for error messages.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs external commands. Package backends, supervisors and config
/// validators all go through this so they can be tested with scripted output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runner name for logs.
    fn name(&self) -> &str;

    /// Run a command to completion, honouring `spec.timeout`.
    ///
    /// A non-zero exit is not an error; callers inspect [`CommandOutput`].
    async fn execute(&self, spec: &CommandSpec) -> RuntimeResult<CommandOutput>;

    /// Whether `program` resolves on `PATH`.
    async fn is_command_available(&self, program: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("apt-get")
            .with_args(["install", "-y", "nginx"])
            .with_env("DEBIAN_FRONTEND", "noninteractive")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(spec.program, "apt-get");
        assert_eq!(spec.args, vec!["install", "-y", "nginx"]);
        assert_eq!(
            spec.env.get("DEBIAN_FRONTEND").map(String::as_str),
            Some("noninteractive")
        );
        assert_eq!(spec.timeout, Duration::from_secs(5));
        assert_eq!(spec.to_string(), "apt-get install -y nginx");
    }

    #[test]
    fn test_from_command_line() {
        let spec = CommandSpec::from_command_line("  nginx -t -c /tmp/nginx.conf ").unwrap();
        assert_eq!(spec.program, "nginx");
        assert_eq!(spec.args, vec!["-t", "-c", "/tmp/nginx.conf"]);
        assert!(CommandSpec::from_command_line("   ").is_none());
    }

    #[test]
    fn test_command_output_diagnostic_prefers_stderr() {
        let out = CommandOutput::new("out\n".into(), " err \n".into(), Some(1));
        assert!(!out.success());
        assert_eq!(out.diagnostic(), "err");

        let out = CommandOutput::new("only stdout\n".into(), String::new(), Some(2));
        assert_eq!(out.diagnostic(), "only stdout");
    }

    #[test]
    fn test_signal_exit_is_not_success() {
        let out = CommandOutput::new(String::new(), String::new(), None);
        assert!(!out.success());
    }
}
