//! Install command handler.

use std::process::ExitCode;

use anyhow::{Context, Result};

use lempxpert::{InstallReport, Orchestrator};

use super::common::{load_config, load_plan};
use super::EXIT_INSTALL_FAILED;

/// Run the install pipeline over the configured services.
pub(crate) async fn cmd_install(only: Vec<String>) -> Result<ExitCode> {
    let config = load_config()?;
    let plan = load_plan(&config, &only)?;
    let orchestrator = Orchestrator::from_config(&config)
        .await
        .context("Failed to set up host backends")?;

    println!(
        "Using {} packages and {} services",
        orchestrator.installer().backend_name(),
        orchestrator.controller().supervisor_name()
    );
    println!("Plan: {}", plan.names().join(" -> "));
    println!();

    let report = orchestrator.install(&plan).await?;
    print_report(&report);

    Ok(ExitCode::from(exit_status(&report)))
}

pub(crate) fn exit_status(report: &InstallReport) -> u8 {
    if report.succeeded() {
        0
    } else {
        EXIT_INSTALL_FAILED
    }
}

fn print_report(report: &InstallReport) {
    for status in &report.statuses {
        match &status.last_error {
            Some(error) => println!("  {:<10} {:<13} {}", status.service, status.state, error),
            None => println!("  {:<10} {}", status.service, status.state),
        }
    }
    println!();

    for health in &report.health {
        println!("  {:<10} health: {}", health.service, health.summary());
    }

    let elapsed = report.finished_at - report.started_at;
    match &report.failure {
        None => println!(
            "\nStack is up ({:.1}s).",
            elapsed.num_milliseconds() as f64 / 1000.0
        ),
        Some(failure) => println!("\nInstall failed: {}", failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lempxpert::error::{ControlError, StageError};
    use lempxpert::{LifecycleState, OrchestrationError, ServiceStatus, Stage};

    fn report(failure: Option<OrchestrationError>) -> InstallReport {
        InstallReport {
            statuses: vec![ServiceStatus::with_state("nginx", LifecycleState::Running)],
            failure,
            health: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_exit_status_success() {
        assert_eq!(exit_status(&report(None)), 0);
    }

    #[test]
    fn test_exit_status_failed_run() {
        let failed = report(Some(OrchestrationError::StageFailed {
            service: "nginx".into(),
            stage: Stage::Start,
            cause: StageError::Control(ControlError::StartTimeout {
                service: "nginx".into(),
                timeout: std::time::Duration::from_secs(30),
            }),
        }));
        assert_eq!(exit_status(&failed), EXIT_INSTALL_FAILED);
    }
}
