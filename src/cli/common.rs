//! Shared CLI helpers used across multiple command handlers.

use anyhow::{Context, Result};

use lempxpert::{Config, InstallPlan};

/// Load the config file (or defaults) with env overrides applied.
pub(crate) fn load_config() -> Result<Config> {
    Config::load().with_context(|| format!("Failed to load {}", Config::path().display()))
}

/// Build the plan from `config`, narrowed to `only` when it is non-empty.
pub(crate) fn load_plan(config: &Config, only: &[String]) -> Result<InstallPlan> {
    let plan = config.plan().context("Invalid service plan")?;
    if only.is_empty() {
        return Ok(plan);
    }
    plan.subset(only)
        .with_context(|| format!("Cannot restrict plan to {}", only.join(", ")))
}
