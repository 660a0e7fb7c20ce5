//! Configuration management for LEMPXpert
//!
//! Configuration is loaded from `~/.lempxpert/config.json` (or the file named
//! by `LEMPXPERT_CONFIG`) with environment variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{LempError, Result};
use crate::service::InstallPlan;
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the LEMPXpert configuration directory path (~/.lempxpert)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lempxpert")
    }

    /// Returns the path to the config file. `LEMPXPERT_CONFIG` wins over
    /// `~/.lempxpert/config.json`.
    pub fn path() -> PathBuf {
        match std::env::var("LEMPXPERT_CONFIG") {
            Ok(path) if !path.trim().is_empty() => expand_home(path.trim()),
            _ => Self::dir().join("config.json"),
        }
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                LempError::Config(format!("{}: {}", path.display(), e))
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: LEMPXPERT_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LEMPXPERT_STATE_DIR") {
            self.paths.state_dir = Some(val);
        }
        if let Ok(val) = std::env::var("LEMPXPERT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("LEMPXPERT_LOG_FORMAT") {
            if let Ok(v) = serde_json::from_value(serde_json::Value::String(val.to_lowercase())) {
                self.logging.format = v;
            }
        }
        if let Ok(val) = std::env::var("LEMPXPERT_SUPERVISOR") {
            if let Ok(v) = val.parse() {
                self.supervisor = v;
            }
        }
        if let Ok(val) = std::env::var("LEMPXPERT_PACKAGE_MANAGER") {
            if let Ok(v) = val.parse() {
                self.package_manager = v;
            }
        }

        // Timeouts
        if let Ok(val) = std::env::var("LEMPXPERT_TIMEOUTS_INSTALL_SECS") {
            if let Ok(v) = val.parse() {
                self.timeouts.install_secs = v;
            }
        }
        if let Ok(val) = std::env::var("LEMPXPERT_TIMEOUTS_START_SECS") {
            if let Ok(v) = val.parse() {
                self.timeouts.start_secs = v;
            }
        }
        if let Ok(val) = std::env::var("LEMPXPERT_TIMEOUTS_STOP_SECS") {
            if let Ok(v) = val.parse() {
                self.timeouts.stop_secs = v;
            }
        }
        if let Ok(val) = std::env::var("LEMPXPERT_TIMEOUTS_CHECK_MS") {
            if let Ok(v) = val.parse() {
                self.timeouts.check_ms = v;
            }
        }
        if let Ok(val) = std::env::var("LEMPXPERT_TIMEOUTS_COMMAND_SECS") {
            if let Ok(v) = val.parse() {
                self.timeouts.command_secs = v;
            }
        }

        if let Ok(val) = std::env::var("LEMPXPERT_ORCHESTRATION_START_RETRIES") {
            if let Ok(v) = val.parse() {
                self.orchestration.start_retries = v;
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory for staging copies and the package registry.
    pub fn state_dir(&self) -> PathBuf {
        match &self.paths.state_dir {
            Some(dir) if !dir.trim().is_empty() => expand_home(dir.trim()),
            _ => Self::dir(),
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    pub fn registry_path(&self) -> PathBuf {
        crate::installer::Registry::path_in(&self.state_dir())
    }

    /// Dependency-ordered plan of the configured services.
    pub fn plan(&self) -> Result<InstallPlan> {
        Ok(InstallPlan::new(self.services.clone())?)
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::from(path);
    }

    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            if path.len() > 1 && path.chars().nth(1) == Some('/') {
                return home.join(&path[2..]);
            }
            return home;
        }
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.supervisor, SupervisorKind::Auto);
        assert_eq!(config.package_manager, PackageManagerKind::Auto);
        assert_eq!(config.orchestration.start_retries, 1);
        assert_eq!(config.services.len(), 3);
        assert!(config.params.contains_key("server_name"));
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"supervisor": "sysv", "timeouts": {"start_secs": 5}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.supervisor, SupervisorKind::Sysv);
        assert_eq!(config.timeouts.start_secs, 5);
        assert_eq!(config.timeouts.stop_secs, 30);
        assert_eq!(config.services.len(), 3);
    }

    #[test]
    fn test_config_roundtrip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.params.insert("server_name".into(), "shop.example".into());
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.params["server_name"], "shop.example");
        assert_eq!(loaded.services, config.services);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_path(&dir.path().join("none.json")).unwrap();
        assert_eq!(config.services.len(), 3);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(LempError::Config(_))
        ));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("LEMPXPERT_ORCHESTRATION_START_RETRIES", "4");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("LEMPXPERT_ORCHESTRATION_START_RETRIES");
        assert_eq!(config.orchestration.start_retries, 4);
    }

    #[test]
    fn test_state_dir() {
        let mut config = Config::default();
        assert_eq!(config.state_dir(), Config::dir());
        config.paths.state_dir = Some("/var/lib/lempxpert".into());
        assert_eq!(config.staging_dir(), PathBuf::from("/var/lib/lempxpert/staging"));
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/var/lib/lempxpert/registry.json")
        );
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/state"), home.join("state"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_default_plan_order() {
        let plan = Config::default().plan().unwrap();
        assert_eq!(plan.names(), vec!["mysql", "php-fpm", "nginx"]);
    }

    #[test]
    fn test_plan_rejects_cycle() {
        let mut config = Config::default();
        config.services[0].depends_on.push("nginx".into());
        assert!(matches!(config.plan(), Err(LempError::Orchestration(_))));
    }
}
