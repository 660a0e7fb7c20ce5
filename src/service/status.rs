//! Per-service lifecycle tracking.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Position of a service in the install pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotInstalled,
    Installed,
    Configured,
    Running,
    Failed,
}

impl LifecycleState {
    /// Order of the forward path; `Failed` is off the path.
    fn rank(self) -> Option<u8> {
        match self {
            LifecycleState::NotInstalled => Some(0),
            LifecycleState::Installed => Some(1),
            LifecycleState::Configured => Some(2),
            LifecycleState::Running => Some(3),
            LifecycleState::Failed => None,
        }
    }

    /// `next` is at or after `self` on the forward path.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        match (self.rank(), next.rank()) {
            (Some(cur), Some(nxt)) => nxt >= cur,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::NotInstalled => "not_installed",
            LifecycleState::Installed => "installed",
            LifecycleState::Configured => "configured",
            LifecycleState::Running => "running",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Attempted to move a status backwards or out of `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("service '{service}' cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub service: String,
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Lifecycle state of one service plus its last error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub state: LifecycleState,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl ServiceStatus {
    /// A service nothing has been done to yet.
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_state(service, LifecycleState::NotInstalled)
    }

    pub fn with_state(service: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            service: service.into(),
            state,
            last_error: None,
        }
    }

    /// Move forward. Re-asserting the current state is a no-op.
    pub fn advance(&mut self, next: LifecycleState) -> Result<(), InvalidTransition> {
        if next == LifecycleState::Failed || !self.state.can_advance_to(next) {
            return Err(InvalidTransition {
                service: self.service.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Any state may fail.
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.state = LifecycleState::Failed;
        self.last_error = Some(error.to_string());
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn is_failed(&self) -> bool {
        self.state == LifecycleState::Failed
    }
}
