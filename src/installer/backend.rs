//! Package manager backends.
//!
//! `PackageBackend` abstracts the host package manager so the installer can be
//! tested without touching the system. `AptBackend` and `DnfBackend` shell out
//! through a [`CommandRunner`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::runtime::{CommandOutput, CommandRunner, CommandSpec, RuntimeError};
use crate::service::PackageSpec;

/// Timeout for read-only queries (`dpkg-query`, `rpm -q`).
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure reported by a package manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("package not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

impl From<RuntimeError> for BackendError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Timeout(t) => BackendError::Timeout(t),
            RuntimeError::ExecutionFailed(msg) => BackendError::Failed(msg),
        }
    }
}

/// A host package manager.
#[async_trait]
pub trait PackageBackend: Send + Sync {
    /// Backend name ("apt", "dnf").
    fn name(&self) -> &str;

    /// Installed version of `package`, or `None` if it is not installed.
    async fn installed_version(&self, package: &str) -> Result<Option<String>, BackendError>;

    /// Install `package`, honouring its version constraint where the
    /// manager supports it.
    async fn install(&self, package: &PackageSpec, timeout: Duration)
        -> Result<(), BackendError>;

    /// Remove `package`.
    async fn remove(&self, package: &str, timeout: Duration) -> Result<(), BackendError>;
}

fn check_exit(output: CommandOutput, classify: fn(&str) -> BackendError) -> Result<(), BackendError> {
    if output.success() {
        Ok(())
    } else {
        Err(classify(&output.diagnostic()))
    }
}

// ============================================================================
// apt (Debian, Ubuntu)
// ============================================================================

/// Debian-family backend: `dpkg-query` to inspect, `apt-get` to change.
pub struct AptBackend {
    runner: Arc<dyn CommandRunner>,
}

impl AptBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn apt_get(&self, args: Vec<String>, timeout: Duration) -> CommandSpec {
        CommandSpec::new("apt-get")
            .with_args(args)
            .with_env("DEBIAN_FRONTEND", "noninteractive")
            .with_timeout(timeout)
    }
}

/// Map apt-get diagnostics to an error kind.
pub fn classify_apt(diagnostic: &str) -> BackendError {
    let lower = diagnostic.to_lowercase();
    if lower.contains("unable to locate package")
        || lower.contains("has no installation candidate")
        || (lower.contains("version") && lower.contains("was not found"))
    {
        BackendError::NotFound(diagnostic.to_string())
    } else if lower.contains("permission denied")
        || lower.contains("are you root")
        || lower.contains("could not open lock file")
    {
        BackendError::PermissionDenied(diagnostic.to_string())
    } else {
        BackendError::Failed(diagnostic.to_string())
    }
}

#[async_trait]
impl PackageBackend for AptBackend {
    fn name(&self) -> &str {
        "apt"
    }

    async fn installed_version(&self, package: &str) -> Result<Option<String>, BackendError> {
        let spec = CommandSpec::new("dpkg-query")
            .with_args(["-W", "-f=${db:Status-Status} ${Version}", package])
            .with_timeout(QUERY_TIMEOUT);
        let output = self.runner.execute(&spec).await?;
        if !output.success() {
            // dpkg-query exits 1 for packages it has never seen.
            return Ok(None);
        }
        let line = output.stdout.trim();
        match line.split_once(' ') {
            Some(("installed", version)) if !version.is_empty() => {
                Ok(Some(version.to_string()))
            }
            _ => Ok(None),
        }
    }

    async fn install(
        &self,
        package: &PackageSpec,
        timeout: Duration,
    ) -> Result<(), BackendError> {
        let target = match &package.version {
            Some(v) => format!("{}={}*", package.name, v),
            None => package.name.clone(),
        };
        let spec = self.apt_get(
            vec![
                "install".into(),
                "-y".into(),
                "--no-install-recommends".into(),
                target,
            ],
            timeout,
        );
        check_exit(self.runner.execute(&spec).await?, classify_apt)
    }

    async fn remove(&self, package: &str, timeout: Duration) -> Result<(), BackendError> {
        let spec = self.apt_get(vec!["remove".into(), "-y".into(), package.into()], timeout);
        check_exit(self.runner.execute(&spec).await?, classify_apt)
    }
}

// ============================================================================
// dnf (Fedora, RHEL)
// ============================================================================

/// RPM-family backend: `rpm -q` to inspect, `dnf` to change.
pub struct DnfBackend {
    runner: Arc<dyn CommandRunner>,
}

impl DnfBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

/// Map dnf diagnostics to an error kind.
pub fn classify_dnf(diagnostic: &str) -> BackendError {
    let lower = diagnostic.to_lowercase();
    if lower.contains("no match for argument") || lower.contains("unable to find a match") {
        BackendError::NotFound(diagnostic.to_string())
    } else if lower.contains("superuser privileges") || lower.contains("permission denied") {
        BackendError::PermissionDenied(diagnostic.to_string())
    } else {
        BackendError::Failed(diagnostic.to_string())
    }
}

#[async_trait]
impl PackageBackend for DnfBackend {
    fn name(&self) -> &str {
        "dnf"
    }

    async fn installed_version(&self, package: &str) -> Result<Option<String>, BackendError> {
        let spec = CommandSpec::new("rpm")
            .with_args(["-q", "--qf", "%{VERSION}-%{RELEASE}", package])
            .with_timeout(QUERY_TIMEOUT);
        let output = self.runner.execute(&spec).await?;
        let version = output.stdout.trim();
        if !output.success() || version.is_empty() {
            return Ok(None);
        }
        Ok(Some(version.to_string()))
    }

    async fn install(
        &self,
        package: &PackageSpec,
        timeout: Duration,
    ) -> Result<(), BackendError> {
        let target = match &package.version {
            Some(v) => format!("{}-{}*", package.name, v),
            None => package.name.clone(),
        };
        let spec = CommandSpec::new("dnf")
            .with_args(["install".to_string(), "-y".to_string(), target])
            .with_timeout(timeout);
        check_exit(self.runner.execute(&spec).await?, classify_dnf)
    }

    async fn remove(&self, package: &str, timeout: Duration) -> Result<(), BackendError> {
        let spec = CommandSpec::new("dnf")
            .with_args(["remove", "-y", package])
            .with_timeout(timeout);
        check_exit(self.runner.execute(&spec).await?, classify_dnf)
    }
}

// ============================================================================
// Mock backend (tests)
// ============================================================================

/// In-memory backend for tests.
#[cfg(test)]
pub struct MockBackend {
    /// package -> installed version
    pub installed: std::sync::Mutex<std::collections::HashMap<String, String>>,
    /// Version a successful install leaves behind.
    pub install_version: std::sync::Mutex<String>,
    /// Error returned by the next install.
    pub install_error: std::sync::Mutex<Option<BackendError>>,
    pub install_calls: std::sync::atomic::AtomicUsize,
    pub remove_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockBackend {
    pub fn new(install_version: &str) -> Self {
        Self {
            installed: std::sync::Mutex::new(std::collections::HashMap::new()),
            install_version: std::sync::Mutex::new(install_version.to_string()),
            install_error: std::sync::Mutex::new(None),
            install_calls: std::sync::atomic::AtomicUsize::new(0),
            remove_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn with_installed(self, package: &str, version: &str) -> Self {
        self.installed
            .lock()
            .unwrap()
            .insert(package.to_string(), version.to_string());
        self
    }

    pub fn failing(self, err: BackendError) -> Self {
        *self.install_error.lock().unwrap() = Some(err);
        self
    }

    pub fn installs(&self) -> usize {
        self.install_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.remove_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn is_installed(&self, package: &str) -> bool {
        self.installed.lock().unwrap().contains_key(package)
    }
}

#[cfg(test)]
#[async_trait]
impl PackageBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn installed_version(&self, package: &str) -> Result<Option<String>, BackendError> {
        Ok(self.installed.lock().unwrap().get(package).cloned())
    }

    async fn install(
        &self,
        package: &PackageSpec,
        _timeout: Duration,
    ) -> Result<(), BackendError> {
        self.install_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(err) = self.install_error.lock().unwrap().take() {
            return Err(err);
        }
        let version = self.install_version.lock().unwrap().clone();
        self.installed
            .lock()
            .unwrap()
            .insert(package.name.clone(), version);
        Ok(())
    }

    async fn remove(&self, package: &str, _timeout: Duration) -> Result<(), BackendError> {
        self.remove_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.installed.lock().unwrap().remove(package);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::MockCommandRunner;

    fn output(stdout: &str, stderr: &str, code: i32) -> CommandOutput {
        CommandOutput::new(stdout.to_string(), stderr.to_string(), Some(code))
    }

    #[test]
    fn test_classify_apt() {
        assert!(matches!(
            classify_apt("E: Unable to locate package nginx-extras-foo"),
            BackendError::NotFound(_)
        ));
        assert!(matches!(
            classify_apt("E: Package 'php8.1-fpm' has no installation candidate"),
            BackendError::NotFound(_)
        ));
        assert!(matches!(
            classify_apt("E: Version '8.1*' for 'php-fpm' was not found"),
            BackendError::NotFound(_)
        ));
        assert!(matches!(
            classify_apt(
                "E: Could not open lock file /var/lib/dpkg/lock-frontend - open (13: Permission denied)"
            ),
            BackendError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_apt("E: Sub-process /usr/bin/dpkg returned an error code (1)"),
            BackendError::Failed(_)
        ));
    }

    #[test]
    fn test_classify_dnf() {
        assert!(matches!(
            classify_dnf("No match for argument: nginx-foo"),
            BackendError::NotFound(_)
        ));
        assert!(matches!(
            classify_dnf("Error: This command has to be run with superuser privileges"),
            BackendError::PermissionDenied(_)
        ));
        assert!(matches!(classify_dnf("Error: transaction failed"), BackendError::Failed(_)));
    }

    #[tokio::test]
    async fn test_apt_installed_version() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_execute()
            .withf(|spec| spec.program == "dpkg-query" && spec.args.last().unwrap() == "nginx")
            .returning(|_| Ok(output("installed 1.18.0-6ubuntu14.4", "", 0)));
        let apt = AptBackend::new(Arc::new(runner));
        assert_eq!(
            apt.installed_version("nginx").await.unwrap().as_deref(),
            Some("1.18.0-6ubuntu14.4")
        );
    }

    #[tokio::test]
    async fn test_apt_not_installed_variants() {
        for (stdout, stderr, code) in [
            ("", "dpkg-query: no packages found matching x", 1),
            ("config-files 1.18.0", "", 0),
        ] {
            let mut runner = MockCommandRunner::new();
            runner
                .expect_execute()
                .returning(move |_| Ok(output(stdout, stderr, code)));
            let apt = AptBackend::new(Arc::new(runner));
            assert_eq!(apt.installed_version("x").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_apt_install_pins_version_and_is_noninteractive() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_execute()
            .withf(|spec| {
                spec.program == "apt-get"
                    && spec.args == vec!["install", "-y", "--no-install-recommends", "php8.1-fpm=8.1*"]
                    && spec.env.get("DEBIAN_FRONTEND").map(String::as_str) == Some("noninteractive")
                    && spec.timeout == Duration::from_secs(90)
            })
            .returning(|_| Ok(output("", "", 0)));
        let apt = AptBackend::new(Arc::new(runner));
        let pkg = PackageSpec::new("php8.1-fpm").with_version("8.1");
        apt.install(&pkg, Duration::from_secs(90)).await.unwrap();
    }

    #[tokio::test]
    async fn test_apt_install_failure_classified() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_execute()
            .returning(|_| Ok(output("", "E: Unable to locate package nope", 100)));
        let apt = AptBackend::new(Arc::new(runner));
        let err = apt
            .install(&PackageSpec::new("nope"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_runner_timeout_maps_to_backend_timeout() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_execute()
            .returning(|spec| Err(RuntimeError::Timeout(spec.timeout)));
        let apt = AptBackend::new(Arc::new(runner));
        let err = apt
            .install(&PackageSpec::new("nginx"), Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Timeout(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_dnf_version_and_install() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_execute()
            .withf(|spec| spec.program == "rpm")
            .returning(|_| Ok(output("1.24.0-1.fc39", "", 0)));
        runner
            .expect_execute()
            .withf(|spec| spec.program == "dnf" && spec.args.last().unwrap() == "nginx-1.24*")
            .returning(|_| Ok(output("", "", 0)));
        let dnf = DnfBackend::new(Arc::new(runner));
        assert_eq!(
            dnf.installed_version("nginx").await.unwrap().as_deref(),
            Some("1.24.0-1.fc39")
        );
        dnf.install(
            &PackageSpec::new("nginx").with_version("1.24"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_dnf_not_installed() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_execute()
            .returning(|_| Ok(output("package nginx is not installed", "", 1)));
        let dnf = DnfBackend::new(Arc::new(runner));
        assert_eq!(dnf.installed_version("nginx").await.unwrap(), None);
    }
}
