//! Error types for LEMPXpert
//!
//! One `thiserror` enum per component (installer, renderer, controller,
//! orchestrator) so that every failure carries the service name, the stage
//! and the underlying cause. `LempError` is the crate-level error used for
//! configuration and registry I/O.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// Installer
// ============================================================================

/// Failure to bring a service's package to the required state.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The package manager has no such package (or no candidate at that version).
    #[error("package '{package}' for service '{service}' not found")]
    PackageNotFound { service: String, package: String },

    /// The package manager refused to run (not root, lock held, ...).
    #[error("permission denied installing '{package}' for service '{service}': {message}")]
    PermissionDenied {
        service: String,
        package: String,
        message: String,
    },

    /// The package is present but at a version that does not satisfy the constraint.
    #[error(
        "version conflict for '{package}' (service '{service}'): installed {installed}, required {required}"
    )]
    VersionConflict {
        service: String,
        package: String,
        installed: String,
        required: String,
    },

    /// The package manager did not finish within the caller-supplied timeout.
    #[error("installing '{package}' for service '{service}' timed out after {timeout:?}")]
    Timeout {
        service: String,
        package: String,
        timeout: Duration,
    },

    /// Any other package manager failure.
    #[error("package manager failed for '{package}' (service '{service}'): {message}")]
    Backend {
        service: String,
        package: String,
        message: String,
    },
}

// ============================================================================
// Renderer
// ============================================================================

/// Failure to produce a staged configuration file.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A template placeholder has no value in the supplied parameters.
    #[error("missing parameter '{key}' for service '{service}'")]
    MissingParameter { service: String, key: String },

    /// The template could not be located or read.
    #[error("template '{template}' for service '{service}' unavailable: {message}")]
    TemplateNotFound {
        service: String,
        template: String,
        message: String,
    },

    /// Writing the staged copy failed.
    #[error("failed to stage config for service '{service}' at {}: {source}", .path.display())]
    Staging {
        service: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Controller
// ============================================================================

/// Failure to move a service to its desired supervisor state.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The unit did not become active within the timeout.
    #[error("service '{service}' did not start within {timeout:?}")]
    StartTimeout { service: String, timeout: Duration },

    /// The unit did not stop within the timeout.
    #[error("service '{service}' did not stop within {timeout:?}")]
    StopTimeout { service: String, timeout: Duration },

    /// The staged or live configuration was rejected by the service's validator.
    #[error("configuration for service '{service}' is invalid: {message}")]
    ConfigInvalid { service: String, message: String },

    /// A service listed in `depends_on` is not running.
    #[error("service '{service}' depends on '{dependency}', which is not running")]
    DependencyNotRunning { service: String, dependency: String },

    /// Reload failed; the service keeps running on its previous configuration.
    #[error("reload of service '{service}' failed (still running on previous config): {message}")]
    ReloadFailed { service: String, message: String },

    /// The supervisor command failed outright.
    #[error("{action} of service '{service}' failed: {message}")]
    Supervisor {
        service: String,
        action: &'static str,
        message: String,
    },

    /// Installing the staged file as the live config failed.
    #[error("failed to promote config for service '{service}' to {}: {source}", .path.display())]
    Promote {
        service: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Pipeline stage in which a service failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Install,
    Configure,
    Start,
    /// Applying a changed config to a service that was already running.
    Reload,
    Probe,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Install => "install",
            Stage::Configure => "configure",
            Stage::Start => "start",
            Stage::Reload => "reload",
            Stage::Probe => "probe",
        };
        f.write_str(s)
    }
}

/// Underlying cause of a stage failure.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Control(#[from] ControlError),

    /// The post-start probe did not pass.
    #[error("health checks failed: {0}")]
    Unhealthy(String),
}

/// Orchestration-level failure.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// Another install run holds the global orchestration lock.
    #[error("another orchestration run is already in progress")]
    AlreadyRunning,

    /// The service list cannot be ordered into a plan.
    #[error("invalid install plan: {0}")]
    InvalidPlan(String),

    /// A service failed at a pipeline stage; later services were not attempted.
    #[error("service '{service}' failed at {stage} stage: {cause}")]
    StageFailed {
        service: String,
        stage: Stage,
        #[source]
        cause: StageError,
    },
}

impl OrchestrationError {
    /// Name of the failing service, if the error is tied to one.
    pub fn service(&self) -> Option<&str> {
        match self {
            OrchestrationError::StageFailed { service, .. } => Some(service),
            _ => None,
        }
    }

    /// Stage at which the run halted, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OrchestrationError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The crate-level error type.
#[derive(Error, Debug)]
pub enum LempError {
    /// Configuration-related errors (invalid config, unknown supervisor, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable package manager or supervisor on this host.
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

/// A specialized `Result` type for LEMPXpert operations.
pub type Result<T> = std::result::Result<T, LempError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LempError::Config("unknown supervisor 'upstart'".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown supervisor 'upstart'"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LempError = io_err.into();
        assert!(matches!(err, LempError::Io(_)));
    }

    #[test]
    fn test_missing_parameter_names_key() {
        let err = RenderError::MissingParameter {
            service: "nginx".into(),
            key: "server_name".into(),
        };
        assert_eq!(
            err.to_string(),
            "missing parameter 'server_name' for service 'nginx'"
        );
    }

    #[test]
    fn test_stage_failed_carries_context() {
        let err = OrchestrationError::StageFailed {
            service: "php-fpm".into(),
            stage: Stage::Start,
            cause: ControlError::StartTimeout {
                service: "php-fpm".into(),
                timeout: Duration::from_secs(30),
            }
            .into(),
        };
        assert_eq!(err.service(), Some("php-fpm"));
        assert_eq!(err.stage(), Some(Stage::Start));
        let msg = err.to_string();
        assert!(msg.contains("php-fpm"));
        assert!(msg.contains("start stage"));
        assert!(msg.contains("did not start"));
    }

    #[test]
    fn test_already_running_has_no_service() {
        let err = OrchestrationError::AlreadyRunning;
        assert!(err.service().is_none());
        assert!(err.stage().is_none());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Install.to_string(), "install");
        assert_eq!(Stage::Configure.to_string(), "configure");
        assert_eq!(Stage::Start.to_string(), "start");
        assert_eq!(Stage::Reload.to_string(), "reload");
        assert_eq!(Stage::Probe.to_string(), "probe");
    }

    #[test]
    fn test_install_error_variants_display() {
        let nf = InstallError::PackageNotFound {
            service: "mysql".into(),
            package: "mysql-server".into(),
        };
        assert!(nf.to_string().contains("not found"));

        let vc = InstallError::VersionConflict {
            service: "php-fpm".into(),
            package: "php8.1-fpm".into(),
            installed: "8.3.1".into(),
            required: "8.1".into(),
        };
        let msg = vc.to_string();
        assert!(msg.contains("8.3.1"));
        assert!(msg.contains("8.1"));
    }
}
