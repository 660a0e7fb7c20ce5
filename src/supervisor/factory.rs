//! Supervisor selection.

use std::path::Path;
use std::sync::Arc;

use crate::config::SupervisorKind;
use crate::runtime::CommandRunner;

use super::systemd::SystemdSupervisor;
use super::sysv::SysvSupervisor;
use super::types::Supervisor;

/// Present when systemd is PID 1.
const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";

/// Resolve `Auto` by looking for the systemd runtime directory under `root`.
pub fn resolve_kind(kind: SupervisorKind, root: &Path) -> SupervisorKind {
    match kind {
        SupervisorKind::Auto => {
            let marker = root.join(SYSTEMD_RUNTIME_DIR.trim_start_matches('/'));
            if marker.is_dir() {
                SupervisorKind::Systemd
            } else {
                SupervisorKind::Sysv
            }
        }
        other => other,
    }
}

/// Create the supervisor for `kind`, detecting systemd when `Auto`.
pub fn create_supervisor(kind: SupervisorKind, runner: Arc<dyn CommandRunner>) -> Arc<dyn Supervisor> {
    match resolve_kind(kind, Path::new("/")) {
        SupervisorKind::Systemd => Arc::new(SystemdSupervisor::new(runner)),
        _ => Arc::new(SysvSupervisor::new(runner)),
    }
}

/// Names of the supervision mechanisms this build supports.
pub fn available_supervisors() -> Vec<&'static str> {
    vec!["systemd", "sysv"]
}
