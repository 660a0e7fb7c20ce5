//! Supervisor capability trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Failure reported by a supervision mechanism.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("supervisor command timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

impl From<RuntimeError> for SupervisorError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Timeout(t) => SupervisorError::Timeout(t),
            RuntimeError::ExecutionFailed(msg) => SupervisorError::Failed(msg),
        }
    }
}

/// One way of supervising services (systemd, SysV init scripts, ...).
///
/// Implementations only issue the command; waiting for the unit to become
/// active is the controller's job.
#[async_trait]
pub trait Supervisor: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError>;

    async fn stop(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError>;

    /// Re-read configuration without a restart.
    async fn reload(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError>;

    /// Whether the unit is currently up.
    async fn is_active(&self, unit: &str) -> Result<bool, SupervisorError>;
}

/// Controller-side state of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ControlState {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlState::Stopped => "stopped",
            ControlState::Starting => "starting",
            ControlState::Running => "running",
            ControlState::Stopping => "stopping",
            ControlState::Failed => "failed",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// State the caller wants a service in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Running,
    Stopped,
}
