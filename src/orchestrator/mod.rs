//! Orchestrator: runs the install pipeline and read-only test passes.
//!
//! For each service in plan order: install the package, render and promote
//! the config, start the service, probe it. The first failure halts the run,
//! rolls back the failing service and leaves later services untouched.
//! Services that already came up healthy keep running.

pub mod report;

pub use report::{InstallReport, TestReport};

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{ControlError, OrchestrationError, Result, Stage, StageError};
use crate::health::{HealthProber, HealthReport, ServiceHealth};
use crate::installer::{create_backend, PackageInstaller};
use crate::log_component;
use crate::render::ConfigRenderer;
use crate::runtime::{CommandRunner, NativeRunner};
use crate::service::{InstallPlan, LifecycleState, ServiceSpec, ServiceStatus};
use crate::supervisor::{
    create_supervisor, ControlState, ControlTimeouts, DesiredState, Promotion, ServiceController,
};

/// Retry policy applied by the orchestrator. Lower layers never retry.
#[derive(Debug, Clone, Copy)]
pub struct OrchestrationPolicy {
    /// Extra start attempts after a `StartTimeout`.
    pub start_retries: u32,
}

impl Default for OrchestrationPolicy {
    fn default() -> Self {
        Self { start_retries: 1 }
    }
}

type StageResult = std::result::Result<(), (Stage, StageError)>;

pub struct Orchestrator {
    installer: PackageInstaller,
    renderer: ConfigRenderer,
    controller: ServiceController,
    prober: HealthProber,
    params: BTreeMap<String, String>,
    policy: OrchestrationPolicy,
    run_lock: Mutex<()>,
    statuses: RwLock<Vec<ServiceStatus>>,
    reports: RwLock<Vec<HealthReport>>,
}

impl Orchestrator {
    pub fn new(
        installer: PackageInstaller,
        renderer: ConfigRenderer,
        controller: ServiceController,
        prober: HealthProber,
        params: BTreeMap<String, String>,
        policy: OrchestrationPolicy,
    ) -> Self {
        Self {
            installer,
            renderer,
            controller,
            prober,
            params,
            policy,
            run_lock: Mutex::new(()),
            statuses: RwLock::new(Vec::new()),
            reports: RwLock::new(Vec::new()),
        }
    }

    /// Wire up the host backends described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(NativeRunner::new());
        let backend = create_backend(config.package_manager, runner.clone()).await?;
        let supervisor = create_supervisor(config.supervisor, runner.clone());

        let installer =
            PackageInstaller::new(backend, config.registry_path(), config.timeouts.install());
        let renderer = ConfigRenderer::new(config.staging_dir());
        let controller = ServiceController::new(
            supervisor,
            runner.clone(),
            ControlTimeouts {
                start: config.timeouts.start(),
                stop: config.timeouts.stop(),
                command: config.timeouts.command(),
            },
        );
        let prober = HealthProber::new(config.timeouts.check(), runner);
        let policy = OrchestrationPolicy {
            start_retries: config.orchestration.start_retries,
        };

        log_component!(
            debug,
            "orchestrator",
            "Backends selected",
            package_manager = installer.backend_name(),
            supervisor = controller.supervisor_name(),
        );
        Ok(Self::new(
            installer,
            renderer,
            controller,
            prober,
            config.params.clone(),
            policy,
        ))
    }

    pub fn installer(&self) -> &PackageInstaller {
        &self.installer
    }

    pub fn controller(&self) -> &ServiceController {
        &self.controller
    }

    pub fn renderer(&self) -> &ConfigRenderer {
        &self.renderer
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Statuses of the current or most recent install run.
    pub async fn statuses(&self) -> Vec<ServiceStatus> {
        self.statuses.read().await.clone()
    }

    /// Every health report produced so far, oldest first.
    pub async fn reports(&self) -> Vec<HealthReport> {
        self.reports.read().await.clone()
    }

    async fn publish(&self, status: &ServiceStatus) {
        let mut statuses = self.statuses.write().await;
        if let Some(slot) = statuses.iter_mut().find(|s| s.service == status.service) {
            *slot = status.clone();
        }
    }

    async fn advance(&self, status: &mut ServiceStatus, next: LifecycleState) {
        if let Err(e) = status.advance(next) {
            log_component!(error, "orchestrator", "Lifecycle violation", error = display(&e));
            return;
        }
        self.publish(status).await;
    }

    async fn record(&self, health: &ServiceHealth) {
        self.reports
            .write()
            .await
            .extend(health.reports.iter().cloned());
    }

    /// Run the install pipeline over `plan`.
    ///
    /// Always returns a complete report; `Err` only when another run holds
    /// the orchestration lock.
    pub async fn install(
        &self,
        plan: &InstallPlan,
    ) -> std::result::Result<InstallReport, OrchestrationError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| OrchestrationError::AlreadyRunning)?;

        let started_at = Utc::now();
        let mut statuses: Vec<ServiceStatus> =
            plan.iter().map(|s| ServiceStatus::new(&s.name)).collect();
        *self.statuses.write().await = statuses.clone();

        log_component!(
            info,
            "orchestrator",
            "Install run started",
            services = plan.names().join(",").as_str(),
        );

        let mut health = Vec::new();
        let mut failure = None;

        for (spec, status) in plan.iter().zip(statuses.iter_mut()) {
            let mut promotion = None;
            if let Err((stage, cause)) = self
                .run_service(spec, status, &mut promotion, &mut health)
                .await
            {
                log_component!(
                    error,
                    "orchestrator",
                    "Service failed, halting run",
                    service = spec.name.as_str(),
                    stage = display(stage),
                    error = display(&cause),
                );
                self.rollback(spec, stage, promotion.as_ref()).await;
                status.fail(&cause);
                self.publish(status).await;
                failure = Some(OrchestrationError::StageFailed {
                    service: spec.name.clone(),
                    stage,
                    cause,
                });
                break;
            }
        }

        log_component!(
            info,
            "orchestrator",
            "Install run finished",
            ok = failure.is_none(),
        );
        Ok(InstallReport {
            statuses,
            failure,
            health,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_service(
        &self,
        spec: &ServiceSpec,
        status: &mut ServiceStatus,
        promotion: &mut Option<Promotion>,
        health: &mut Vec<ServiceHealth>,
    ) -> StageResult {
        self.installer
            .ensure_installed(spec)
            .await
            .map_err(|e| (Stage::Install, e.into()))?;
        self.advance(status, LifecycleState::Installed).await;

        let file = self
            .renderer
            .render(spec, &self.params)
            .map_err(|e| (Stage::Configure, e.into()))?;
        // A unit left running by an earlier run only picks up a new config
        // through a reload; starting it again is a no-op.
        let was_running = self.controller.refresh(spec).await == ControlState::Running;
        let promoted = self
            .controller
            .promote(&file, spec)
            .await
            .map_err(|e| (Stage::Configure, e.into()))?;
        let changed = promoted.changed;
        *promotion = Some(promoted);
        self.advance(status, LifecycleState::Configured).await;

        if was_running {
            if changed {
                self.controller
                    .reload(spec)
                    .await
                    .map_err(|e| (Stage::Reload, e.into()))?;
                log_component!(
                    info,
                    "orchestrator",
                    "Reloaded with new config",
                    service = spec.name.as_str(),
                );
            }
        } else {
            self.start_with_retry(spec)
                .await
                .map_err(|e| (Stage::Start, e.into()))?;
        }
        self.advance(status, LifecycleState::Running).await;

        let probe = self.prober.probe(spec).await;
        self.record(&probe).await;
        let healthy = probe.is_healthy();
        let summary = probe.summary();
        health.push(probe);
        if !healthy {
            return Err((Stage::Probe, StageError::Unhealthy(summary)));
        }
        Ok(())
    }

    async fn start_with_retry(&self, spec: &ServiceSpec) -> std::result::Result<(), ControlError> {
        let mut attempt = 0;
        loop {
            match self.controller.apply(spec, DesiredState::Running).await {
                Ok(_) => return Ok(()),
                Err(err @ ControlError::StartTimeout { .. })
                    if attempt < self.policy.start_retries =>
                {
                    attempt += 1;
                    log_component!(
                        warn,
                        "orchestrator",
                        "Start timed out, retrying",
                        service = spec.name.as_str(),
                        attempt = attempt,
                        max_retries = self.policy.start_retries,
                        error = display(&err),
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Undo what the failing service's run did. Errors are logged only; the
    /// original failure is what gets reported.
    async fn rollback(&self, spec: &ServiceSpec, stage: Stage, promotion: Option<&Promotion>) {
        let brought_up = matches!(stage, Stage::Start | Stage::Probe)
            && self.controller.state(&spec.name).await != ControlState::Stopped;
        if brought_up {
            if let Err(e) = self.controller.apply(spec, DesiredState::Stopped).await {
                log_component!(
                    error,
                    "orchestrator",
                    "Rollback stop failed",
                    service = spec.name.as_str(),
                    error = display(&e),
                );
            }
        }
        if let Some(promotion) = promotion {
            if let Err(e) = self.controller.restore(promotion).await {
                log_component!(
                    error,
                    "orchestrator",
                    "Rollback restore failed",
                    service = spec.name.as_str(),
                    error = display(&e),
                );
            }
        }
        log_component!(
            info,
            "orchestrator",
            "Rolled back",
            service = spec.name.as_str(),
            stopped = brought_up,
            config_restored = promotion.is_some(),
        );
    }

    /// Probe every service in plan order. Changes no package, config or
    /// status; safe to run while `install` is in progress.
    pub async fn test(&self, plan: &InstallPlan) -> TestReport {
        let report = probe_plan(&self.prober, plan).await;
        for health in &report.services {
            self.record(health).await;
        }
        report
    }
}

/// Probe every service of `plan` in order with `prober` alone. Needs no
/// package manager or supervisor, so it works on any host.
pub async fn probe_plan(prober: &HealthProber, plan: &InstallPlan) -> TestReport {
    let mut services = Vec::with_capacity(plan.len());
    for spec in plan.iter() {
        services.push(prober.probe(spec).await);
    }
    let report = TestReport::new(services);
    log_component!(
        info,
        "orchestrator",
        "Test pass finished",
        passed = report.passed(),
    );
    report
}
