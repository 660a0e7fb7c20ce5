//! Results of orchestration runs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{OrchestrationError, Stage};
use crate::health::{CheckOutcome, ServiceHealth};
use crate::service::{LifecycleState, ServiceStatus};

/// Outcome of `install`: every service's final status in plan order, the
/// failure that halted the run (if any) and every probe made.
#[derive(Debug)]
pub struct InstallReport {
    pub statuses: Vec<ServiceStatus>,
    pub failure: Option<OrchestrationError>,
    pub health: Vec<ServiceHealth>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl InstallReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn status(&self, service: &str) -> Option<&ServiceStatus> {
        self.statuses.iter().find(|s| s.service == service)
    }

    pub fn state(&self, service: &str) -> Option<LifecycleState> {
        self.status(service).map(|s| s.state)
    }

    /// Service and stage that halted the run.
    pub fn failed_at(&self) -> Option<(&str, Stage)> {
        let failure = self.failure.as_ref()?;
        Some((failure.service()?, failure.stage()?))
    }
}

/// Outcome of a read-only `test` pass.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub services: Vec<ServiceHealth>,
    pub checked_at: DateTime<Utc>,
}

impl TestReport {
    pub fn new(services: Vec<ServiceHealth>) -> Self {
        Self {
            services,
            checked_at: Utc::now(),
        }
    }

    /// Every service passed.
    pub fn passed(&self) -> bool {
        self.services.iter().all(ServiceHealth::is_healthy)
    }

    /// Number of services per aggregate outcome: (pass, fail, error).
    pub fn counts(&self) -> (usize, usize, usize) {
        self.services
            .iter()
            .fold((0, 0, 0), |(p, f, e), s| match s.outcome {
                CheckOutcome::Pass => (p + 1, f, e),
                CheckOutcome::Fail => (p, f + 1, e),
                CheckOutcome::Error => (p, f, e + 1),
            })
    }
}
