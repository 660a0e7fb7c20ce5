//! Service controller.
//!
//! Drives each service's supervisor state machine:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!      any state -> Failed
//! ```
//!
//! Also owns promotion of staged configs to their live paths, since only the
//! controller may change what a running service reads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::ControlError;
use crate::log_component;
use crate::render::{write_atomic, ConfigFile};
use crate::runtime::{CommandRunner, CommandSpec};
use crate::service::{LifecycleState, ServiceSpec, ServiceStatus};

use super::types::{ControlState, DesiredState, Supervisor, SupervisorError};

/// How often `is_active` is polled while waiting for a transition.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Suffix of the backup taken before a live config is replaced.
pub const BACKUP_SUFFIX: &str = ".lempxpert.bak";

/// Controller timeouts.
#[derive(Debug, Clone, Copy)]
pub struct ControlTimeouts {
    pub start: Duration,
    pub stop: Duration,
    /// Reloads and config validation commands.
    pub command: Duration,
}

impl Default for ControlTimeouts {
    fn default() -> Self {
        Self {
            start: Duration::from_secs(30),
            stop: Duration::from_secs(30),
            command: Duration::from_secs(60),
        }
    }
}

/// Record of a promoted config, enough to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub service: String,
    pub live_path: PathBuf,
    /// Previous live file, if there was one.
    pub backup: Option<PathBuf>,
    pub digest: String,
    /// The live contents differ from what was there before.
    pub changed: bool,
}

fn backup_path(live: &Path) -> PathBuf {
    let mut name = live.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

pub struct ServiceController {
    supervisor: Arc<dyn Supervisor>,
    runner: Arc<dyn CommandRunner>,
    timeouts: ControlTimeouts,
    poll_interval: Duration,
    states: RwLock<HashMap<String, ControlState>>,
}

impl ServiceController {
    pub fn new(
        supervisor: Arc<dyn Supervisor>,
        runner: Arc<dyn CommandRunner>,
        timeouts: ControlTimeouts,
    ) -> Self {
        Self {
            supervisor,
            runner,
            timeouts,
            poll_interval: DEFAULT_POLL_INTERVAL,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn supervisor_name(&self) -> &str {
        self.supervisor.name()
    }

    pub fn timeouts(&self) -> ControlTimeouts {
        self.timeouts
    }

    /// Last known state; services never touched are `Stopped`.
    pub async fn state(&self, service: &str) -> ControlState {
        self.states
            .read()
            .await
            .get(service)
            .copied()
            .unwrap_or(ControlState::Stopped)
    }

    async fn set_state(&self, service: &str, state: ControlState) {
        log_component!(
            debug,
            "controller",
            "State change",
            service = service,
            state = state.as_str(),
        );
        self.states.write().await.insert(service.to_string(), state);
    }

    /// Ask the supervisor and record what it says.
    pub async fn refresh(&self, spec: &ServiceSpec) -> ControlState {
        let state = match self.supervisor.is_active(&spec.unit).await {
            Ok(true) => ControlState::Running,
            Ok(false) => ControlState::Stopped,
            Err(e) => {
                log_component!(
                    warn,
                    "controller",
                    "Could not query supervisor",
                    service = spec.name.as_str(),
                    error = display(&e),
                );
                ControlState::Failed
            }
        };
        self.set_state(&spec.name, state).await;
        state
    }

    /// Move `spec` to `desired`. Already being there is a no-op.
    ///
    /// Returns the resulting lifecycle status: `Running` after a start,
    /// `Configured` after a stop.
    pub async fn apply(
        &self,
        spec: &ServiceSpec,
        desired: DesiredState,
    ) -> Result<ServiceStatus, ControlError> {
        match desired {
            DesiredState::Running => {
                if self.state(&spec.name).await != ControlState::Running {
                    self.start(spec).await?;
                }
                Ok(ServiceStatus::with_state(&spec.name, LifecycleState::Running))
            }
            DesiredState::Stopped => {
                if self.state(&spec.name).await != ControlState::Stopped {
                    self.stop(spec).await?;
                }
                Ok(ServiceStatus::with_state(
                    &spec.name,
                    LifecycleState::Configured,
                ))
            }
        }
    }

    async fn start(&self, spec: &ServiceSpec) -> Result<(), ControlError> {
        for dependency in &spec.depends_on {
            if self.state(dependency).await != ControlState::Running {
                return Err(ControlError::DependencyNotRunning {
                    service: spec.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let timeout = self.timeouts.start;
        let deadline = Instant::now() + timeout;
        self.set_state(&spec.name, ControlState::Starting).await;
        log_component!(
            info,
            "controller",
            "Starting service",
            service = spec.name.as_str(),
            unit = spec.unit.as_str(),
            supervisor = self.supervisor.name(),
        );

        if let Err(e) = self.supervisor.start(&spec.unit, timeout).await {
            self.set_state(&spec.name, ControlState::Failed).await;
            return Err(match e {
                SupervisorError::Timeout(_) => ControlError::StartTimeout {
                    service: spec.name.clone(),
                    timeout,
                },
                SupervisorError::Failed(message) => ControlError::Supervisor {
                    service: spec.name.clone(),
                    action: "start",
                    message,
                },
            });
        }

        if self.wait_for(spec, true, deadline).await {
            self.set_state(&spec.name, ControlState::Running).await;
            Ok(())
        } else {
            self.set_state(&spec.name, ControlState::Failed).await;
            Err(ControlError::StartTimeout {
                service: spec.name.clone(),
                timeout,
            })
        }
    }

    async fn stop(&self, spec: &ServiceSpec) -> Result<(), ControlError> {
        let timeout = self.timeouts.stop;
        let deadline = Instant::now() + timeout;
        self.set_state(&spec.name, ControlState::Stopping).await;
        log_component!(
            info,
            "controller",
            "Stopping service",
            service = spec.name.as_str(),
            unit = spec.unit.as_str(),
        );

        if let Err(e) = self.supervisor.stop(&spec.unit, timeout).await {
            self.set_state(&spec.name, ControlState::Failed).await;
            return Err(match e {
                SupervisorError::Timeout(_) => ControlError::StopTimeout {
                    service: spec.name.clone(),
                    timeout,
                },
                SupervisorError::Failed(message) => ControlError::Supervisor {
                    service: spec.name.clone(),
                    action: "stop",
                    message,
                },
            });
        }

        if self.wait_for(spec, false, deadline).await {
            self.set_state(&spec.name, ControlState::Stopped).await;
            Ok(())
        } else {
            self.set_state(&spec.name, ControlState::Failed).await;
            Err(ControlError::StopTimeout {
                service: spec.name.clone(),
                timeout,
            })
        }
    }

    /// Poll until the unit's activity matches `active` or `deadline` passes.
    async fn wait_for(&self, spec: &ServiceSpec, active: bool, deadline: Instant) -> bool {
        loop {
            match self.supervisor.is_active(&spec.unit).await {
                Ok(state) if state == active => return true,
                Ok(_) => {}
                Err(e) => log_component!(
                    debug,
                    "controller",
                    "Supervisor query failed while waiting",
                    service = spec.name.as_str(),
                    error = display(&e),
                ),
            }
            if Instant::now() >= deadline {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Reload a running service. On failure it keeps running on the
    /// previous configuration.
    pub async fn reload(&self, spec: &ServiceSpec) -> Result<ServiceStatus, ControlError> {
        if self.state(&spec.name).await != ControlState::Running {
            return Err(ControlError::ReloadFailed {
                service: spec.name.clone(),
                message: "service is not running".to_string(),
            });
        }
        self.supervisor
            .reload(&spec.unit, self.timeouts.command)
            .await
            .map_err(|e| {
                log_component!(
                    warn,
                    "controller",
                    "Reload failed",
                    service = spec.name.as_str(),
                    error = display(&e),
                );
                ControlError::ReloadFailed {
                    service: spec.name.clone(),
                    message: e.to_string(),
                }
            })?;
        Ok(ServiceStatus::with_state(&spec.name, LifecycleState::Running))
    }

    /// Run the service's validation command against a config file.
    async fn validate(&self, spec: &ServiceSpec, path: &Path) -> Result<(), ControlError> {
        let Some(template) = &spec.validate_command else {
            return Ok(());
        };
        let line = template.replace("{path}", &path.display().to_string());
        let command = CommandSpec::from_command_line(&line)
            .ok_or_else(|| ControlError::ConfigInvalid {
                service: spec.name.clone(),
                message: "validation command is empty".to_string(),
            })?
            .with_timeout(self.timeouts.command);

        let output = self
            .runner
            .execute(&command)
            .await
            .map_err(|e| ControlError::ConfigInvalid {
                service: spec.name.clone(),
                message: format!("could not run '{}': {}", command, e),
            })?;
        if output.success() {
            Ok(())
        } else {
            Err(ControlError::ConfigInvalid {
                service: spec.name.clone(),
                message: output.diagnostic(),
            })
        }
    }

    /// Validate the staged file, back up the live file and atomically
    /// replace it. A rejected config leaves the live file untouched.
    pub async fn promote(
        &self,
        file: &ConfigFile,
        spec: &ServiceSpec,
    ) -> Result<Promotion, ControlError> {
        self.validate(spec, &file.staged_path).await?;

        let live = &file.live_path;
        let promote_err = |source: std::io::Error| ControlError::Promote {
            service: spec.name.clone(),
            path: live.clone(),
            source,
        };

        let changed = match std::fs::read_to_string(live) {
            Ok(previous) => previous != file.contents,
            Err(_) => true,
        };
        let backup = if live.exists() {
            let backup = backup_path(live);
            std::fs::copy(live, &backup).map_err(promote_err)?;
            Some(backup)
        } else {
            None
        };
        write_atomic(live, &file.contents).map_err(promote_err)?;

        log_component!(
            info,
            "controller",
            "Config promoted",
            service = spec.name.as_str(),
            path = display(live.display()),
            digest = file.digest.as_str(),
            changed = changed,
        );
        Ok(Promotion {
            service: spec.name.clone(),
            live_path: live.clone(),
            backup,
            digest: file.digest.clone(),
            changed,
        })
    }

    /// Undo a promotion: put the backup back, or remove the file if there
    /// was nothing before it.
    pub async fn restore(&self, promotion: &Promotion) -> Result<(), ControlError> {
        let promote_err = |source: std::io::Error| ControlError::Promote {
            service: promotion.service.clone(),
            path: promotion.live_path.clone(),
            source,
        };
        match &promotion.backup {
            Some(backup) => {
                let previous = std::fs::read_to_string(backup).map_err(promote_err)?;
                write_atomic(&promotion.live_path, &previous).map_err(promote_err)?;
                std::fs::remove_file(backup).map_err(promote_err)?;
            }
            None => match std::fs::remove_file(&promotion.live_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(promote_err(e)),
            },
        }
        log_component!(
            info,
            "controller",
            "Config restored",
            service = promotion.service.as_str(),
            path = display(promotion.live_path.display()),
        );
        Ok(())
    }
}
