//! Package installer.
//!
//! `ensure_installed` brings a service's package to a version that satisfies
//! its constraint and is idempotent: when an acceptable version is already
//! present the backend's install is never invoked. A failed or
//! non-conforming install is removed again before the error is returned.

pub mod backend;
pub mod registry;

pub use backend::{AptBackend, BackendError, DnfBackend, PackageBackend};
pub use registry::{Registry, RegistryEntry};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::PackageManagerKind;
use crate::error::{InstallError, LempError, Result};
use crate::log_component;
use crate::runtime::CommandRunner;
use crate::service::ServiceSpec;

/// What `ensure_installed` found or did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// An acceptable version was already installed; nothing was changed.
    AlreadyPresent { version: String },
    /// The package was installed by this call.
    Installed { version: String },
}

impl InstallOutcome {
    pub fn version(&self) -> &str {
        match self {
            InstallOutcome::AlreadyPresent { version } | InstallOutcome::Installed { version } => {
                version
            }
        }
    }
}

/// Strip a Debian epoch (`1:`) from a version string.
fn strip_epoch(version: &str) -> &str {
    match version.split_once(':') {
        Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
            rest
        }
        _ => version,
    }
}

/// Whether `installed` satisfies the dotted-prefix `constraint`.
///
/// `8.1` accepts `8.1`, `8.1.2` and `8.1.2-1ubuntu1` but not `8.10`.
pub fn version_satisfies(installed: &str, constraint: Option<&str>) -> bool {
    let Some(constraint) = constraint.map(str::trim).filter(|c| !c.is_empty()) else {
        return true;
    };
    let installed = strip_epoch(installed.trim());
    let constraint = strip_epoch(constraint);
    match installed.strip_prefix(constraint) {
        Some(rest) => !rest.starts_with(|c: char| c.is_ascii_digit()),
        None => false,
    }
}

/// Ensures service packages are present through a [`PackageBackend`].
pub struct PackageInstaller {
    backend: Arc<dyn PackageBackend>,
    registry: RwLock<Registry>,
    registry_path: PathBuf,
    timeout: Duration,
}

impl PackageInstaller {
    /// Create an installer. The registry is loaded from `registry_path`; a
    /// corrupt registry is logged and replaced.
    pub fn new(backend: Arc<dyn PackageBackend>, registry_path: PathBuf, timeout: Duration) -> Self {
        let registry = Registry::load(&registry_path).unwrap_or_else(|e| {
            log_component!(warn, "installer", "Ignoring unreadable registry", error = display(&e));
            Registry::default()
        });
        Self {
            backend,
            registry: RwLock::new(registry),
            registry_path,
            timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Snapshot of the package registry.
    pub async fn registry(&self) -> Registry {
        self.registry.read().await.clone()
    }

    fn map_error(&self, spec: &ServiceSpec, err: BackendError) -> InstallError {
        let service = spec.name.clone();
        let package = spec.package.name.clone();
        match err {
            BackendError::NotFound(_) => InstallError::PackageNotFound { service, package },
            BackendError::PermissionDenied(message) => InstallError::PermissionDenied {
                service,
                package,
                message,
            },
            BackendError::Timeout(timeout) => InstallError::Timeout {
                service,
                package,
                timeout,
            },
            BackendError::Failed(message) => InstallError::Backend {
                service,
                package,
                message,
            },
        }
    }

    /// Remove a package this call put on the system. Errors are logged only:
    /// the caller is already returning the original failure.
    async fn revert(&self, spec: &ServiceSpec) {
        let present = matches!(
            self.backend.installed_version(&spec.package.name).await,
            Ok(Some(_))
        );
        if !present {
            return;
        }
        log_component!(
            warn,
            "installer",
            "Removing package after failed install",
            service = spec.name.as_str(),
            package = spec.package.name.as_str(),
        );
        if let Err(e) = self.backend.remove(&spec.package.name, self.timeout).await {
            log_component!(
                error,
                "installer",
                "Failed to remove package",
                service = spec.name.as_str(),
                package = spec.package.name.as_str(),
                error = display(&e),
            );
        }
    }

    /// Make sure `spec`'s package is installed at an acceptable version.
    pub async fn ensure_installed(
        &self,
        spec: &ServiceSpec,
    ) -> std::result::Result<InstallOutcome, InstallError> {
        let package = &spec.package;
        let constraint = package.version.as_deref();

        let current = self
            .backend
            .installed_version(&package.name)
            .await
            .map_err(|e| self.map_error(spec, e))?;

        if let Some(version) = current {
            if version_satisfies(&version, constraint) {
                log_component!(
                    debug,
                    "installer",
                    "Package already present",
                    service = spec.name.as_str(),
                    package = package.name.as_str(),
                    version = version.as_str(),
                );
                return Ok(InstallOutcome::AlreadyPresent { version });
            }
            // Not ours to remove.
            return Err(InstallError::VersionConflict {
                service: spec.name.clone(),
                package: package.name.clone(),
                installed: version,
                required: constraint.unwrap_or_default().to_string(),
            });
        }

        log_component!(
            info,
            "installer",
            "Installing package",
            service = spec.name.as_str(),
            package = package.name.as_str(),
            backend = self.backend.name(),
        );
        if let Err(e) = self.backend.install(package, self.timeout).await {
            let err = self.map_error(spec, e);
            self.revert(spec).await;
            return Err(err);
        }

        let installed = match self.backend.installed_version(&package.name).await {
            Ok(Some(version)) => version,
            Ok(None) => {
                return Err(InstallError::Backend {
                    service: spec.name.clone(),
                    package: package.name.clone(),
                    message: "package manager reported success but package is not installed"
                        .to_string(),
                })
            }
            Err(e) => {
                let err = self.map_error(spec, e);
                self.revert(spec).await;
                return Err(err);
            }
        };

        if !version_satisfies(&installed, constraint) {
            self.revert(spec).await;
            return Err(InstallError::VersionConflict {
                service: spec.name.clone(),
                package: package.name.clone(),
                installed,
                required: constraint.unwrap_or_default().to_string(),
            });
        }

        self.record(spec, &installed).await;
        log_component!(
            info,
            "installer",
            "Package installed",
            service = spec.name.as_str(),
            package = package.name.as_str(),
            version = installed.as_str(),
        );
        Ok(InstallOutcome::Installed { version: installed })
    }

    async fn record(&self, spec: &ServiceSpec, version: &str) {
        let mut registry = self.registry.write().await;
        registry.set(
            spec.name.clone(),
            RegistryEntry {
                package: spec.package.name.clone(),
                version: version.to_string(),
                installed_at: Utc::now(),
            },
        );
        if let Err(e) = registry.save(&self.registry_path) {
            log_component!(
                warn,
                "installer",
                "Failed to save registry",
                path = display(self.registry_path.display()),
                error = display(&e),
            );
        }
    }
}

/// Pick a backend: the configured one, or whichever package manager is on `PATH`.
pub async fn create_backend(
    kind: PackageManagerKind,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn PackageBackend>> {
    match kind {
        PackageManagerKind::Apt => Ok(Arc::new(AptBackend::new(runner))),
        PackageManagerKind::Dnf => Ok(Arc::new(DnfBackend::new(runner))),
        PackageManagerKind::Auto => {
            if runner.is_command_available("apt-get").await {
                Ok(Arc::new(AptBackend::new(runner)))
            } else if runner.is_command_available("dnf").await {
                Ok(Arc::new(DnfBackend::new(runner)))
            } else {
                Err(LempError::NotAvailable(
                    "no supported package manager (apt-get or dnf) found on PATH".to_string(),
                ))
            }
        }
    }
}
