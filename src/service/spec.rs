//! Declarative description of a managed service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::health::CheckDef;

/// A system package and the version it must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name as the package manager knows it (e.g. "php8.1-fpm").
    pub name: String,
    /// Dotted version prefix (e.g. "8.1"). `None` accepts any version.
    #[serde(default)]
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Where a service's config template comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateSource {
    /// One of the templates compiled into the binary ("nginx", "php-fpm", "mysql").
    Builtin { name: String },
    /// A template file on disk.
    File { path: PathBuf },
    /// Template text given directly in the config.
    Inline { text: String },
}

impl TemplateSource {
    /// Short label for logs and errors.
    pub fn label(&self) -> String {
        match self {
            TemplateSource::Builtin { name } => format!("builtin:{}", name),
            TemplateSource::File { path } => path.display().to_string(),
            TemplateSource::Inline { .. } => "inline".to_string(),
        }
    }
}

/// A managed service. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service name (e.g. "nginx").
    pub name: String,
    /// Package that provides the service.
    pub package: PackageSpec,
    /// Config template.
    pub template: TemplateSource,
    /// Live config file the rendered template is promoted to.
    pub config_path: PathBuf,
    /// Supervisor unit used to start, stop and reload the service.
    pub unit: String,
    /// Command that validates a config file; `{path}` is replaced with the
    /// staged file (e.g. `nginx -t -q -c {path}`).
    #[serde(default)]
    pub validate_command: Option<String>,
    /// Services that must be running before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Health checks run after start and by `test`.
    #[serde(default)]
    pub checks: Vec<CheckDef>,
    /// Template parameters that override the global ones.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ServiceSpec {
    /// Minimal spec with an inline empty template; used by builders and tests.
    pub fn new(name: impl Into<String>, package: PackageSpec, unit: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            config_path: PathBuf::from(format!("/etc/lempxpert/{}.conf", name)),
            name,
            package,
            template: TemplateSource::Inline {
                text: String::new(),
            },
            unit: unit.into(),
            validate_command: None,
            depends_on: Vec::new(),
            checks: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_template(mut self, template: TemplateSource) -> Self {
        self.template = template;
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn with_validate_command(mut self, command: impl Into<String>) -> Self {
        self.validate_command = Some(command.into());
        self
    }

    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.push(service.into());
        self
    }

    pub fn with_check(mut self, check: CheckDef) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// File name of the live config, used for the staged copy.
    pub fn config_file_name(&self) -> String {
        self.config_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.conf", self.name))
    }
}
