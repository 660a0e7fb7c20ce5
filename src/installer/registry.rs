//! JSON registry of packages installed by lempxpert.
//!
//! Persists to `<state_dir>/registry.json`, keyed by service name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LempError, Result};

/// One installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub package: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
}

/// In-memory registry backed by a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(flatten)]
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    /// Load from a JSON file. Returns an empty registry if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            LempError::Config(format!("corrupt registry {}: {}", path.display(), e))
        })
    }

    /// Save to a JSON file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn get(&self, service: &str) -> Option<&RegistryEntry> {
        self.entries.get(service)
    }

    pub fn set(&mut self, service: impl Into<String>, entry: RegistryEntry) {
        self.entries.insert(service.into(), entry);
    }

    pub fn remove(&mut self, service: &str) -> Option<RegistryEntry> {
        self.entries.remove(service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.entries.contains_key(service)
    }

    /// Entries in service-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegistryEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registry file inside a state directory.
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join("registry.json")
    }
}
