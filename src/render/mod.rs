//! Config renderer.
//!
//! Substitutes `{{ key }}` placeholders in a service's template and writes the
//! result to a per-service staging directory. Nothing here touches a live
//! config; promotion is the controller's job.

pub mod templates;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::RenderError;
use crate::log_component;
use crate::service::{ServiceSpec, TemplateSource};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// A rendered config sitting in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub service: String,
    pub staged_path: PathBuf,
    /// Where the controller will install it.
    pub live_path: PathBuf,
    pub contents: String,
    /// Hex SHA-256 of `contents`.
    pub digest: String,
}

/// Placeholder keys in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for cap in PLACEHOLDER_RE.captures_iter(template) {
        let key = &cap[1];
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Substitute every placeholder. Fails on the first key (in template order)
/// that `params` does not define.
pub fn render_text(
    service: &str,
    template: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, RenderError> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|k| !params.contains_key(k))
    {
        return Err(RenderError::MissingParameter {
            service: service.to_string(),
            key: missing,
        });
    }
    Ok(PLACEHOLDER_RE
        .replace_all(template, |cap: &regex::Captures<'_>| params[&cap[1]].clone())
        .into_owned())
}

fn digest(contents: &str) -> String {
    hex::encode(Sha256::digest(contents.as_bytes()))
}

/// Renders service templates into `<staging_dir>/<service>/<file>`.
#[derive(Debug, Clone)]
pub struct ConfigRenderer {
    staging_dir: PathBuf,
}

impl ConfigRenderer {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Staged location for a service's config.
    pub fn staging_path(&self, spec: &ServiceSpec) -> PathBuf {
        self.staging_dir
            .join(&spec.name)
            .join(spec.config_file_name())
    }

    fn load_template(&self, spec: &ServiceSpec) -> Result<String, RenderError> {
        match &spec.template {
            TemplateSource::Builtin { name } => templates::builtin(name)
                .map(str::to_string)
                .ok_or_else(|| RenderError::TemplateNotFound {
                    service: spec.name.clone(),
                    template: spec.template.label(),
                    message: format!(
                        "no built-in template (available: {})",
                        templates::builtin_names().join(", ")
                    ),
                }),
            TemplateSource::File { path } => {
                std::fs::read_to_string(path).map_err(|e| RenderError::TemplateNotFound {
                    service: spec.name.clone(),
                    template: spec.template.label(),
                    message: e.to_string(),
                })
            }
            TemplateSource::Inline { text } => Ok(text.clone()),
        }
    }

    /// Render `spec`'s template with `params` overlaid by `spec.params`, and
    /// stage the result. The staged file is replaced atomically.
    pub fn render(
        &self,
        spec: &ServiceSpec,
        params: &BTreeMap<String, String>,
    ) -> Result<ConfigFile, RenderError> {
        let template = self.load_template(spec)?;

        let mut merged = params.clone();
        merged.extend(spec.params.iter().map(|(k, v)| (k.clone(), v.clone())));

        let contents = render_text(&spec.name, &template, &merged)?;
        let staged_path = self.staging_path(spec);
        write_atomic(&staged_path, &contents).map_err(|source| RenderError::Staging {
            service: spec.name.clone(),
            path: staged_path.clone(),
            source,
        })?;

        let file = ConfigFile {
            service: spec.name.clone(),
            staged_path,
            live_path: spec.config_path.clone(),
            digest: digest(&contents),
            contents,
        };
        log_component!(
            info,
            "renderer",
            "Config staged",
            service = spec.name.as_str(),
            path = display(file.staged_path.display()),
            digest = file.digest.as_str(),
        );
        Ok(file)
    }
}

/// Write via a temp file in the same directory, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::PackageSpec;
    use tempfile::TempDir;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn inline_spec(text: &str) -> ServiceSpec {
        ServiceSpec::new("nginx", PackageSpec::new("nginx"), "nginx")
            .with_template(TemplateSource::Inline { text: text.into() })
            .with_config_path("/etc/nginx/nginx.conf")
    }

    #[test]
    fn test_placeholders_in_order_dedup() {
        let keys = placeholders("{{ b }} {{a}} {{  b  }} {{c_1}} { {not} }");
        assert_eq!(keys, vec!["b", "a", "c_1"]);
    }

    #[test]
    fn test_render_text_substitutes() {
        let out = render_text(
            "nginx",
            "listen {{ port }};\nserver_name {{name}};",
            &params(&[("port", "8080"), ("name", "example.test")]),
        )
        .unwrap();
        assert_eq!(out, "listen 8080;\nserver_name example.test;");
    }

    #[test]
    fn test_render_text_missing_names_first_key() {
        let err = render_text(
            "nginx",
            "{{ a }} {{ b }} {{ c }}",
            &params(&[("a", "1")]),
        )
        .unwrap_err();
        match err {
            RenderError::MissingParameter { service, key } => {
                assert_eq!(service, "nginx");
                assert_eq!(key, "b");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_render_text_extra_params_ignored() {
        let out = render_text("x", "plain", &params(&[("unused", "1")])).unwrap();
        assert_eq!(out, "plain");
    }

    #[test]
    fn test_render_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let renderer = ConfigRenderer::new(dir.path());
        let spec = inline_spec("a={{ a }} b={{ b }}");
        let p = params(&[("b", "2"), ("a", "1")]);

        let first = renderer.render(&spec, &p).unwrap();
        let bytes_first = std::fs::read(&first.staged_path).unwrap();
        let second = renderer.render(&spec, &p).unwrap();
        let bytes_second = std::fs::read(&second.staged_path).unwrap();

        assert_eq!(first, second);
        assert_eq!(bytes_first, bytes_second);
        assert_eq!(first.contents, "a=1 b=2");
    }

    #[test]
    fn test_render_stages_under_service_dir() {
        let dir = TempDir::new().unwrap();
        let renderer = ConfigRenderer::new(dir.path());
        let spec = inline_spec("x");
        let file = renderer.render(&spec, &BTreeMap::new()).unwrap();
        assert_eq!(file.staged_path, dir.path().join("nginx").join("nginx.conf"));
        assert_eq!(file.live_path, PathBuf::from("/etc/nginx/nginx.conf"));
        assert_eq!(file.digest.len(), 64);
    }

    #[test]
    fn test_service_params_override_globals() {
        let dir = TempDir::new().unwrap();
        let renderer = ConfigRenderer::new(dir.path());
        let spec = inline_spec("port={{ port }}").with_param("port", "8443");
        let file = renderer.render(&spec, &params(&[("port", "80")])).unwrap();
        assert_eq!(file.contents, "port=8443");
    }

    #[test]
    fn test_failed_render_leaves_previous_stage_untouched() {
        let dir = TempDir::new().unwrap();
        let renderer = ConfigRenderer::new(dir.path());
        let good = inline_spec("v={{ v }}");
        let file = renderer.render(&good, &params(&[("v", "1")])).unwrap();

        let bad = inline_spec("v={{ v }} w={{ w }}");
        assert!(renderer.render(&bad, &params(&[("v", "2")])).is_err());
        assert_eq!(std::fs::read_to_string(&file.staged_path).unwrap(), "v=1");
    }

    #[test]
    fn test_builtin_templates_render_with_defaults() {
        let dir = TempDir::new().unwrap();
        let renderer = ConfigRenderer::new(dir.path());
        let globals = crate::service::default_params();
        for spec in crate::service::lemp_services() {
            let file = renderer.render(&spec, &globals).unwrap();
            assert!(!file.contents.contains("{{"), "{}", spec.name);
        }
    }

    #[test]
    fn test_unknown_builtin_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let renderer = ConfigRenderer::new(dir.path());

        let spec = inline_spec("").with_template(TemplateSource::Builtin {
            name: "apache".into(),
        });
        assert!(matches!(
            renderer.render(&spec, &BTreeMap::new()),
            Err(RenderError::TemplateNotFound { .. })
        ));

        let spec = inline_spec("").with_template(TemplateSource::File {
            path: dir.path().join("missing.tpl"),
        });
        assert!(matches!(
            renderer.render(&spec, &BTreeMap::new()),
            Err(RenderError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_file_template() {
        let dir = TempDir::new().unwrap();
        let tpl = dir.path().join("site.tpl");
        std::fs::write(&tpl, "root {{ document_root }};").unwrap();
        let renderer = ConfigRenderer::new(dir.path().join("staging"));
        let spec = inline_spec("").with_template(TemplateSource::File { path: tpl });
        let file = renderer
            .render(&spec, &params(&[("document_root", "/srv/www")]))
            .unwrap();
        assert_eq!(file.contents, "root /srv/www;");
    }
}
