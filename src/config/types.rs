//! Configuration type definitions for LEMPXpert
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a missing or partial config file still yields a usable setup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::service::{default_params, lemp_services, ServiceSpec};

/// Main configuration struct for LEMPXpert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log output settings
    pub logging: LoggingConfig,
    /// Where state (staging, registry) lives
    pub paths: PathsConfig,
    /// Which supervision mechanism to drive
    pub supervisor: SupervisorKind,
    /// Which package manager to drive
    pub package_manager: PackageManagerKind,
    /// Timeouts for external calls
    pub timeouts: TimeoutConfig,
    /// Pipeline policy
    pub orchestration: OrchestrationConfig,
    /// Global template parameters
    pub params: BTreeMap<String, String>,
    /// Managed services; defaults to nginx, php-fpm and mysql
    pub services: Vec<ServiceSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            paths: PathsConfig::default(),
            supervisor: SupervisorKind::default(),
            package_manager: PackageManagerKind::default(),
            timeouts: TimeoutConfig::default(),
            orchestration: OrchestrationConfig::default(),
            params: default_params(),
            services: lemp_services(),
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable tracing output.
    Pretty,
    /// `[timestamp] [LEVEL] target message {fields}`, grep-friendly.
    #[default]
    Component,
    /// JSON lines.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}

// ============================================================================
// Paths
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Holds `staging/` and `registry.json`. Defaults to `~/.lempxpert`.
    pub state_dir: Option<String>,
}

// ============================================================================
// Backends
// ============================================================================

/// Supervision mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorKind {
    /// systemd if it is running, SysV otherwise.
    #[default]
    Auto,
    Systemd,
    Sysv,
}

impl std::str::FromStr for SupervisorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "systemd" => Ok(Self::Systemd),
            "sysv" => Ok(Self::Sysv),
            other => Err(format!("unknown supervisor '{}'", other)),
        }
    }
}

/// Package manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    /// apt-get if present, dnf otherwise.
    #[default]
    Auto,
    Apt,
    Dnf,
}

impl std::str::FromStr for PackageManagerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "apt" => Ok(Self::Apt),
            "dnf" => Ok(Self::Dnf),
            other => Err(format!("unknown package manager '{}'", other)),
        }
    }
}

// ============================================================================
// Timeouts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Package install/remove.
    pub install_secs: u64,
    /// Waiting for a unit to become active.
    pub start_secs: u64,
    /// Waiting for a unit to stop.
    pub stop_secs: u64,
    /// Default per-check timeout.
    pub check_ms: u64,
    /// Reloads and config validation commands.
    pub command_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            install_secs: 600,
            start_secs: 30,
            stop_secs: 30,
            check_ms: 5000,
            command_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }

    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_secs)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn check(&self) -> Duration {
        Duration::from_millis(self.check_ms)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }
}

// ============================================================================
// Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Extra start attempts after a start timeout.
    pub start_retries: u32,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self { start_retries: 1 }
    }
}
