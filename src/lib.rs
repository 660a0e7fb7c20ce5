//! LEMPXpert - LEMP server manager
//!
//! Installs, configures, supervises and health-checks the services of a
//! LEMP stack (nginx, php-fpm, mysql) as one dependency-ordered plan.

pub mod config;
pub mod error;
pub mod health;
pub mod installer;
pub mod orchestrator;
pub mod render;
pub mod runtime;
pub mod service;
pub mod supervisor;
pub mod utils;

pub use config::Config;
pub use error::{LempError, OrchestrationError, Result, Stage};
pub use health::{CheckDef, CheckKind, CheckOutcome, HealthProber, HealthReport, ServiceHealth};
pub use installer::{InstallOutcome, PackageInstaller};
pub use orchestrator::{InstallReport, Orchestrator, TestReport};
pub use render::{ConfigFile, ConfigRenderer};
pub use service::{InstallPlan, LifecycleState, PackageSpec, ServiceSpec, ServiceStatus};
pub use supervisor::{DesiredState, ServiceController};
