//! SysV init supervisor (`service <unit> <action>`), for hosts and containers
//! without systemd.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::{CommandRunner, CommandSpec};

use super::types::{Supervisor, SupervisorError};

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SysvSupervisor {
    runner: Arc<dyn CommandRunner>,
}

impl SysvSupervisor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn service(&self, unit: &str, action: &str, timeout: Duration) -> Result<(), SupervisorError> {
        let spec = CommandSpec::new("service")
            .with_args([unit, action])
            .with_timeout(timeout);
        let output = self.runner.execute(&spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(SupervisorError::Failed(format!(
                "service {} {}: {}",
                unit,
                action,
                output.diagnostic()
            )))
        }
    }
}

#[async_trait]
impl Supervisor for SysvSupervisor {
    fn name(&self) -> &str {
        "sysv"
    }

    async fn start(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError> {
        self.service(unit, "start", timeout).await
    }

    async fn stop(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError> {
        self.service(unit, "stop", timeout).await
    }

    async fn reload(&self, unit: &str, timeout: Duration) -> Result<(), SupervisorError> {
        self.service(unit, "reload", timeout).await
    }

    async fn is_active(&self, unit: &str) -> Result<bool, SupervisorError> {
        // LSB: `status` exits 0 when running, 3 when stopped.
        let spec = CommandSpec::new("service")
            .with_args([unit, "status"])
            .with_timeout(QUERY_TIMEOUT);
        Ok(self.runner.execute(&spec).await?.success())
    }
}
