//! Health checks for managed services.
//!
//! A [`CheckDef`] describes one check (TCP connect, HTTP GET, MySQL ping or
//! command). The [`HealthProber`] runs every check of a service concurrently,
//! each under its own timeout, and returns a [`ServiceHealth`] holding one
//! immutable [`HealthReport`] per check.
//!
//! Outcomes distinguish a check that completed and found a problem
//! ([`CheckOutcome::Fail`]) from one that could not complete, most notably a
//! timeout ([`CheckOutcome::Error`]).

pub mod prober;

pub use prober::HealthProber;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Per-check timeout when the check does not set its own.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

fn default_expected_status() -> u16 {
    200
}

// ============================================================================
// Check definitions
// ============================================================================

/// What a check does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// The port accepts a TCP connection.
    Tcp { host: String, port: u16 },
    /// `GET url` answers with `expected_status`.
    Http {
        url: String,
        #[serde(default = "default_expected_status")]
        expected_status: u16,
    },
    /// A MySQL/MariaDB server sends its protocol handshake.
    MysqlPing { host: String, port: u16 },
    /// A command exits with status 0.
    Command { command: String },
}

impl CheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::Tcp { .. } => "tcp",
            CheckKind::Http { .. } => "http",
            CheckKind::MysqlPing { .. } => "mysql_ping",
            CheckKind::Command { .. } => "command",
        }
    }
}

/// A named check with an optional timeout override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: CheckKind,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl CheckDef {
    pub fn new(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Result of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The check completed and the service looked healthy.
    Pass,
    /// The check completed and found a problem.
    Fail,
    /// The check could not complete (timeout, bad definition, spawn failure).
    Error,
}

impl CheckOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckOutcome::Pass => "pass",
            CheckOutcome::Fail => "fail",
            CheckOutcome::Error => "error",
        }
    }

    pub fn is_pass(self) -> bool {
        self == CheckOutcome::Pass
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one check of one service at one moment. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub service: String,
    pub check: String,
    pub outcome: CheckOutcome,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(
        service: impl Into<String>,
        check: impl Into<String>,
        outcome: CheckOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            check: check.into(),
            outcome,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{}: {}",
            self.outcome, self.service, self.check, self.message
        )
    }
}

/// All reports from one probe of one service, plus the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub outcome: CheckOutcome,
    pub reports: Vec<HealthReport>,
}

impl ServiceHealth {
    /// Aggregate: `Pass` iff every report passes (vacuously for no checks);
    /// otherwise `Fail` if any check failed, else `Error`.
    pub fn from_reports(service: impl Into<String>, reports: Vec<HealthReport>) -> Self {
        let outcome = if reports.iter().all(|r| r.outcome.is_pass()) {
            CheckOutcome::Pass
        } else if reports.iter().any(|r| r.outcome == CheckOutcome::Fail) {
            CheckOutcome::Fail
        } else {
            CheckOutcome::Error
        };
        Self {
            service: service.into(),
            outcome,
            reports,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.outcome.is_pass()
    }

    /// Reports that did not pass.
    pub fn problems(&self) -> impl Iterator<Item = &HealthReport> {
        self.reports.iter().filter(|r| !r.outcome.is_pass())
    }

    /// One-line description of the non-passing checks.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .problems()
            .map(|r| format!("{} {} ({})", r.check, r.outcome, r.message))
            .collect();
        if parts.is_empty() {
            "all checks passed".to_string()
        } else {
            parts.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: CheckOutcome) -> HealthReport {
        HealthReport::new("nginx", "http", outcome, "msg")
    }

    #[test]
    fn test_aggregate_all_pass() {
        let h = ServiceHealth::from_reports(
            "nginx",
            vec![report(CheckOutcome::Pass), report(CheckOutcome::Pass)],
        );
        assert!(h.is_healthy());
        assert_eq!(h.summary(), "all checks passed");
    }

    #[test]
    fn test_aggregate_empty_passes() {
        let h = ServiceHealth::from_reports("nginx", vec![]);
        assert_eq!(h.outcome, CheckOutcome::Pass);
    }

    #[test]
    fn test_aggregate_error_only() {
        let h = ServiceHealth::from_reports(
            "nginx",
            vec![report(CheckOutcome::Pass), report(CheckOutcome::Error)],
        );
        assert_eq!(h.outcome, CheckOutcome::Error);
        assert_eq!(h.problems().count(), 1);
    }

    #[test]
    fn test_aggregate_fail_wins_over_error() {
        let h = ServiceHealth::from_reports(
            "nginx",
            vec![report(CheckOutcome::Error), report(CheckOutcome::Fail)],
        );
        assert_eq!(h.outcome, CheckOutcome::Fail);
        assert!(h.summary().contains("http fail"));
    }

    #[test]
    fn test_check_def_json() {
        let def: CheckDef =
            serde_json::from_str(r#"{"name":"web","type":"http","url":"http://127.0.0.1/"}"#)
                .unwrap();
        assert_eq!(
            def.kind,
            CheckKind::Http {
                url: "http://127.0.0.1/".into(),
                expected_status: 200
            }
        );
        assert!(def.timeout().is_none());

        let def: CheckDef = serde_json::from_str(
            r#"{"name":"db","type":"mysql_ping","host":"127.0.0.1","port":3306,"timeout_ms":1500}"#,
        )
        .unwrap();
        assert_eq!(def.kind.label(), "mysql_ping");
        assert_eq!(def.timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_report_display() {
        let r = HealthReport::new("mysql", "port", CheckOutcome::Fail, "connection refused");
        assert_eq!(r.to_string(), "[fail] mysql/port: connection refused");
    }
}
