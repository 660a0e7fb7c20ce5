//! Health prober: runs a service's checks concurrently under per-check timeouts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::log_component;
use crate::runtime::{CommandRunner, CommandSpec, RuntimeError};
use crate::service::ServiceSpec;

use super::{CheckDef, CheckKind, CheckOutcome, HealthReport, ServiceHealth};

/// Largest handshake packet we are willing to read from a MySQL server.
const MAX_HANDSHAKE_LEN: usize = 64 * 1024;

/// A check that ran to completion but did not pass.
enum Finding {
    /// The service answered wrongly or refused.
    Fail(String),
    /// The check itself could not be carried out.
    Error(String),
}

type CheckResult = std::result::Result<String, Finding>;

/// Runs [`CheckDef`]s. Never returns an error: every failure becomes a report.
pub struct HealthProber {
    default_timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl HealthProber {
    pub fn new(default_timeout: Duration, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            default_timeout,
            runner,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run every check of `spec` concurrently and aggregate.
    pub async fn probe(&self, spec: &ServiceSpec) -> ServiceHealth {
        let started = Instant::now();
        let reports = join_all(spec.checks.iter().map(|c| self.run_check(&spec.name, c))).await;
        let health = ServiceHealth::from_reports(spec.name.clone(), reports);
        log_component!(
            info,
            "prober",
            "Probe finished",
            service = spec.name.as_str(),
            outcome = health.outcome.as_str(),
            checks = health.reports.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
        health
    }

    async fn run_check(&self, service: &str, check: &CheckDef) -> HealthReport {
        let timeout = check.timeout().unwrap_or(self.default_timeout);
        let (outcome, message) =
            match tokio::time::timeout(timeout, self.execute(&check.kind, timeout)).await {
                Err(_) => (
                    CheckOutcome::Error,
                    format!("{} check timed out after {:?}", check.kind.label(), timeout),
                ),
                Ok(Ok(msg)) => (CheckOutcome::Pass, msg),
                Ok(Err(Finding::Fail(msg))) => (CheckOutcome::Fail, msg),
                Ok(Err(Finding::Error(msg))) => (CheckOutcome::Error, msg),
            };
        log_component!(
            debug,
            "prober",
            "Check finished",
            service = service,
            check = check.name.as_str(),
            outcome = outcome.as_str(),
        );
        HealthReport::new(service, check.name.clone(), outcome, message)
    }

    async fn execute(&self, kind: &CheckKind, timeout: Duration) -> CheckResult {
        match kind {
            CheckKind::Tcp { host, port } => check_tcp(host, *port).await,
            CheckKind::Http {
                url,
                expected_status,
            } => check_http(url, *expected_status).await,
            CheckKind::MysqlPing { host, port } => check_mysql(host, *port).await,
            CheckKind::Command { command } => self.check_command(command, timeout).await,
        }
    }

    async fn check_command(&self, command: &str, timeout: Duration) -> CheckResult {
        let spec = CommandSpec::from_command_line(command)
            .ok_or_else(|| Finding::Error("empty health check command".to_string()))?
            .with_timeout(timeout);
        match self.runner.execute(&spec).await {
            Ok(output) if output.success() => Ok(format!("'{}' exited 0", command)),
            Ok(output) => Err(Finding::Fail(format!(
                "'{}' exited {}: {}",
                command,
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "by signal".to_string()),
                output.diagnostic()
            ))),
            Err(RuntimeError::Timeout(t)) => Err(Finding::Error(format!(
                "'{}' timed out after {:?}",
                command, t
            ))),
            Err(e) => Err(Finding::Error(e.to_string())),
        }
    }
}

async fn check_tcp(host: &str, port: u16) -> CheckResult {
    TcpStream::connect((host, port))
        .await
        .map(|_| format!("{}:{} accepting connections", host, port))
        .map_err(|e| Finding::Fail(format!("{}:{} not reachable: {}", host, port, e)))
}

async fn check_http(url: &str, expected_status: u16) -> CheckResult {
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .map_err(|e| Finding::Error(format!("failed to build HTTP client: {}", e)))?;
    match client.get(url).send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == expected_status {
                Ok(format!("GET {} -> {}", url, status))
            } else {
                Err(Finding::Fail(format!(
                    "GET {} -> {} (expected {})",
                    url, status, expected_status
                )))
            }
        }
        Err(e) if e.is_builder() => Err(Finding::Error(format!("invalid request: {}", e))),
        Err(e) if e.is_timeout() => Err(Finding::Error(format!("GET {} timed out", url))),
        Err(e) => Err(Finding::Fail(format!("GET {} failed: {}", url, e))),
    }
}

/// Read the initial handshake packet. Protocol 10 means the server is up and
/// accepting sessions; an error packet (0xff) means it refused us.
async fn check_mysql(host: &str, port: u16) -> CheckResult {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| Finding::Fail(format!("{}:{} not reachable: {}", host, port, e)))?;

    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| Finding::Fail(format!("no handshake from server: {}", e)))?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    if len == 0 || len > MAX_HANDSHAKE_LEN {
        return Err(Finding::Fail(format!("malformed handshake length {}", len)));
    }

    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|e| Finding::Fail(format!("truncated handshake: {}", e)))?;

    parse_handshake(&payload)
}

fn parse_handshake(payload: &[u8]) -> CheckResult {
    match payload.first() {
        Some(0x0a) => {
            let version: Vec<u8> = payload[1..].iter().take_while(|b| **b != 0).copied().collect();
            Ok(format!(
                "server version {}",
                String::from_utf8_lossy(&version)
            ))
        }
        Some(0xff) => {
            let code = if payload.len() >= 3 {
                u16::from_le_bytes([payload[1], payload[2]])
            } else {
                0
            };
            let message = payload.get(3..).map(String::from_utf8_lossy).unwrap_or_default();
            Err(Finding::Fail(format!(
                "server refused connection ({}): {}",
                code,
                message.trim_start_matches('#')
            )))
        }
        Some(other) => Err(Finding::Fail(format!(
            "unexpected protocol version 0x{:02x}",
            other
        ))),
        None => Err(Finding::Fail("empty handshake".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::MockCommandRunner;
    use crate::runtime::{CommandOutput, NativeRunner};
    use crate::service::PackageSpec;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn prober() -> HealthProber {
        HealthProber::new(Duration::from_secs(2), Arc::new(NativeRunner::new()))
    }

    fn spec_with(checks: Vec<CheckDef>) -> ServiceSpec {
        let mut spec = ServiceSpec::new("svc", PackageSpec::new("svc"), "svc");
        spec.checks = checks;
        spec
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Accepts connections and never writes anything.
    async fn silent_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        port
    }

    /// Writes `bytes` to every connection, then closes it.
    async fn scripted_server(bytes: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(&bytes).await;
                let _ = stream.shutdown().await;
            }
        });
        port
    }

    fn mysql_packet(payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u32;
        let mut out = vec![
            (len & 0xff) as u8,
            ((len >> 8) & 0xff) as u8,
            ((len >> 16) & 0xff) as u8,
            0,
        ];
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn test_tcp_pass() {
        let port = silent_server().await;
        let spec = spec_with(vec![CheckDef::new(
            "port",
            CheckKind::Tcp {
                host: "127.0.0.1".into(),
                port,
            },
        )]);
        let health = prober().probe(&spec).await;
        assert!(health.is_healthy(), "{}", health.summary());
        assert_eq!(health.reports[0].service, "svc");
        assert_eq!(health.reports[0].check, "port");
    }

    #[tokio::test]
    async fn test_tcp_refused_is_fail() {
        let port = closed_port().await;
        let spec = spec_with(vec![CheckDef::new(
            "port",
            CheckKind::Tcp {
                host: "127.0.0.1".into(),
                port,
            },
        )]);
        let health = prober().probe(&spec).await;
        assert_eq!(health.reports[0].outcome, CheckOutcome::Fail);
        assert_eq!(health.outcome, CheckOutcome::Fail);
    }

    #[tokio::test]
    async fn test_http_timeout_is_error() {
        let port = silent_server().await;
        let spec = spec_with(vec![CheckDef::new(
            "http",
            CheckKind::Http {
                url: format!("http://127.0.0.1:{}/", port),
                expected_status: 200,
            },
        )
        .with_timeout(Duration::from_millis(300))]);
        let health = prober().probe(&spec).await;
        assert_eq!(health.reports[0].outcome, CheckOutcome::Error);
        assert!(health.reports[0].message.contains("timed out"));
        assert!(!health.is_healthy());
    }

    #[tokio::test]
    async fn test_http_status_mismatch_is_fail() {
        let port = scripted_server(
            b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        )
        .await;
        let spec = spec_with(vec![CheckDef::new(
            "http",
            CheckKind::Http {
                url: format!("http://127.0.0.1:{}/", port),
                expected_status: 200,
            },
        )]);
        let health = prober().probe(&spec).await;
        assert_eq!(health.reports[0].outcome, CheckOutcome::Fail);
        assert!(health.reports[0].message.contains("502"));
    }

    #[tokio::test]
    async fn test_mysql_ping_pass() {
        let mut payload = vec![0x0a];
        payload.extend_from_slice(b"8.0.36-0ubuntu0.22.04.1\0");
        payload.extend_from_slice(&[1, 0, 0, 0]);
        let port = scripted_server(mysql_packet(&payload)).await;
        let spec = spec_with(vec![CheckDef::new(
            "ping",
            CheckKind::MysqlPing {
                host: "127.0.0.1".into(),
                port,
            },
        )]);
        let health = prober().probe(&spec).await;
        assert!(health.is_healthy(), "{}", health.summary());
        assert!(health.reports[0].message.contains("8.0.36"));
    }

    #[tokio::test]
    async fn test_mysql_error_packet_is_fail() {
        let mut payload = vec![0xff, 0x69, 0x04];
        payload.extend_from_slice(b"Host '10.0.0.9' is blocked");
        let port = scripted_server(mysql_packet(&payload)).await;
        let spec = spec_with(vec![CheckDef::new(
            "ping",
            CheckKind::MysqlPing {
                host: "127.0.0.1".into(),
                port,
            },
        )]);
        let health = prober().probe(&spec).await;
        assert_eq!(health.reports[0].outcome, CheckOutcome::Fail);
        assert!(health.reports[0].message.contains("1129"));
        assert!(health.reports[0].message.contains("blocked"));
    }

    #[tokio::test]
    async fn test_mysql_silent_server_times_out() {
        let port = silent_server().await;
        let spec = spec_with(vec![CheckDef::new(
            "ping",
            CheckKind::MysqlPing {
                host: "127.0.0.1".into(),
                port,
            },
        )
        .with_timeout(Duration::from_millis(200))]);
        let health = prober().probe(&spec).await;
        assert_eq!(health.reports[0].outcome, CheckOutcome::Error);
    }

    #[tokio::test]
    async fn test_command_check_outcomes() {
        let mut runner = MockCommandRunner::new();
        runner.expect_execute().returning(|spec| match spec.program.as_str() {
            "mysqladmin" => Ok(CommandOutput::new("mysqld is alive\n".into(), String::new(), Some(0))),
            "false" => Ok(CommandOutput::new(String::new(), "nope\n".into(), Some(1))),
            _ => Err(RuntimeError::Timeout(spec.timeout)),
        });
        let prober = HealthProber::new(Duration::from_secs(1), Arc::new(runner));
        let spec = spec_with(vec![
            CheckDef::new(
                "alive",
                CheckKind::Command {
                    command: "mysqladmin ping".into(),
                },
            ),
            CheckDef::new(
                "broken",
                CheckKind::Command {
                    command: "false".into(),
                },
            ),
            CheckDef::new(
                "slow",
                CheckKind::Command {
                    command: "sleep 30".into(),
                },
            ),
            CheckDef::new(
                "empty",
                CheckKind::Command {
                    command: "  ".into(),
                },
            ),
        ]);
        let health = prober.probe(&spec).await;
        let outcomes: Vec<CheckOutcome> = health.reports.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                CheckOutcome::Pass,
                CheckOutcome::Fail,
                CheckOutcome::Error,
                CheckOutcome::Error
            ]
        );
        assert_eq!(health.outcome, CheckOutcome::Fail);
    }

    #[tokio::test]
    async fn test_checks_run_concurrently() {
        let port = silent_server().await;
        let check = |name: &str| {
            CheckDef::new(
                name,
                CheckKind::Http {
                    url: format!("http://127.0.0.1:{}/", port),
                    expected_status: 200,
                },
            )
            .with_timeout(Duration::from_millis(400))
        };
        let spec = spec_with(vec![check("a"), check("b"), check("c")]);
        let started = Instant::now();
        let health = prober().probe(&spec).await;
        assert_eq!(health.reports.len(), 3);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_no_checks_is_pass() {
        let health = prober().probe(&spec_with(vec![])).await;
        assert!(health.is_healthy());
        assert!(health.reports.is_empty());
    }

    #[test]
    fn test_parse_handshake_unexpected_version() {
        assert!(matches!(parse_handshake(&[0x09, 0]), Err(Finding::Fail(_))));
        assert!(matches!(parse_handshake(&[]), Err(Finding::Fail(_))));
    }
}
