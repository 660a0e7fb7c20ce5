//! systemd supervisor (`systemctl`).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::{CommandRunner, CommandSpec};

use super::types::{Supervisor, SupervisorError};

/// Timeout for `systemctl is-active`.
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SystemdSupervisor {
    runner: Arc<dyn CommandRunner>,
}

impl SystemdSupervisor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn systemctl(&self, verb: &str, unit: &str, timeout: Duration) -> Result<(), SupervisorError> {
        let spec = CommandSpec::new("systemctl")
            .with_args([verb, unit])
            .with_timeout(timeout);
        let output = self.runner.execute(&spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(SupervisorError::Failed(format!(
                "systemctl {} {}: {}",
                verb,
                unit,
                output.diagnostic()
            )))
        }
    }
}

#[async_trait]
impl Supervisor for SystemdSupervisor {
    fn name(&self) -> &str {
        "systemd"
    }

    async fn start(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError> {
        self.systemctl("start", unit, timeout).await
    }

    async fn stop(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError> {
        self.systemctl("stop", unit, timeout).await
    }

    async fn reload(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError> {
        self.systemctl("reload", unit, timeout).await
    }

    async fn is_active(&self, unit: &str) -> Result<bool, SupervisorError> {
        let spec = CommandSpec::new("systemctl")
            .with_args(["is-active", "--quiet", unit])
            .with_timeout(QUERY_TIMEOUT);
        Ok(self.runner.execute(&spec).await?.success())
    }
}
