//! Configuration validation with unknown field detection.
//!
//! `validate_config` works on the raw JSON so it can point at misspelt keys
//! that serde would silently ignore; `validate_services` checks the parsed
//! config (plan ordering, template parameters).

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::health::CheckKind;
use crate::render::{placeholders, templates};
use crate::service::defaults::template_port;
use crate::service::{ServiceSpec, TemplateSource};

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "logging",
    "paths",
    "supervisor",
    "package_manager",
    "timeouts",
    "orchestration",
    "params",
    "services",
];

const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];
const KNOWN_PATHS: &[&str] = &["state_dir"];
const KNOWN_TIMEOUTS: &[&str] = &[
    "install_secs",
    "start_secs",
    "stop_secs",
    "check_ms",
    "command_secs",
];
const KNOWN_ORCHESTRATION: &[&str] = &["start_retries"];
const KNOWN_SERVICE: &[&str] = &[
    "name",
    "package",
    "template",
    "config_path",
    "unit",
    "validate_command",
    "depends_on",
    "checks",
    "params",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

/// Report keys of `obj` not in `known`. Returns true if any were found.
fn check_keys(
    obj: &Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, path, msg));
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);

    for (section, known) in [
        ("logging", KNOWN_LOGGING),
        ("paths", KNOWN_PATHS),
        ("timeouts", KNOWN_TIMEOUTS),
        ("orchestration", KNOWN_ORCHESTRATION),
    ] {
        if let Some(inner) = obj.get(section).and_then(|v| v.as_object()) {
            has_unknown |= check_keys(inner, known, section, &mut diagnostics);
        }
    }

    if let Some(services) = obj.get("services").and_then(|v| v.as_array()) {
        for (i, service) in services.iter().enumerate() {
            if let Some(inner) = service.as_object() {
                let prefix = format!("services[{}]", i);
                has_unknown |= check_keys(inner, KNOWN_SERVICE, &prefix, &mut diagnostics);
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    if let Err(e) = serde_json::from_value::<Config>(raw.clone()) {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            format!("Config does not parse: {}", e),
        ));
    }

    diagnostics
}

/// Check the parsed services: plan ordering and template parameters.
pub fn validate_services(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    match config.plan() {
        Ok(plan) => diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "services",
            format!("Install order: {}", plan.names().join(" -> ")),
        )),
        Err(e) => diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "services",
            e.to_string(),
        )),
    }

    for spec in &config.services {
        let path = format!("services.{}", spec.name);
        let template = match &spec.template {
            TemplateSource::Builtin { name } => match templates::builtin(name) {
                Some(text) => text.to_string(),
                None => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticLevel::Error,
                        format!("{}.template", path),
                        format!("Unknown built-in template '{}'", name),
                    ));
                    continue;
                }
            },
            TemplateSource::Inline { text } => text.clone(),
            // Read at render time; may not exist on the machine running the check.
            TemplateSource::File { path: file } => match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(_) => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticLevel::Warn,
                        format!("{}.template", path),
                        format!("Template file {} is not readable here", file.display()),
                    ));
                    continue;
                }
            },
        };

        let missing: Vec<String> = placeholders(&template)
            .into_iter()
            .filter(|k| !config.params.contains_key(k) && !spec.params.contains_key(k))
            .collect();
        if !missing.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                format!("{}.params", path),
                format!("Missing template parameters: {}", missing.join(", ")),
            ));
        }

        if spec.checks.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                format!("{}.checks", path),
                "No health checks; the service always probes healthy",
            ));
        }

        check_ports(config, spec, &path, &mut diagnostics);
    }

    diagnostics
}

/// Warn when a built-in service's checks target a different port than its
/// rendered config listens on.
fn check_ports(config: &Config, spec: &ServiceSpec, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let TemplateSource::Builtin { name } = &spec.template else {
        return;
    };
    let mut params = config.params.clone();
    params.extend(spec.params.clone());
    let Some(expected) = template_port(name, &params) else {
        return;
    };

    for check in &spec.checks {
        let port = match &check.kind {
            CheckKind::Tcp { port, .. } | CheckKind::MysqlPing { port, .. } => Some(*port),
            CheckKind::Http { url, .. } => reqwest::Url::parse(url)
                .ok()
                .and_then(|u| u.port_or_known_default()),
            CheckKind::Command { .. } => None,
        };
        if let Some(port) = port.filter(|p| *p != expected) {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                format!("{}.checks.{}", path, check.name),
                format!(
                    "Checks port {} but the config listens on {}",
                    port, expected
                ),
            ));
        }
    }
}
