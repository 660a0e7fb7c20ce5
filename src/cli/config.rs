//! Config check command handler.

use std::process::ExitCode;

use anyhow::{Context, Result};

use lempxpert::config::validate::{validate_config, validate_services, Diagnostic, DiagnosticLevel};
use lempxpert::Config;

use super::ConfigAction;

/// Validate configuration file. Exits 1 when errors were found.
pub(crate) fn cmd_config(action: ConfigAction) -> Result<ExitCode> {
    match action {
        ConfigAction::Check => {
            let config_path = Config::path();
            println!("Config file: {}", config_path.display());

            let mut diagnostics: Vec<Diagnostic> = Vec::new();
            let config = if config_path.exists() {
                let content =
                    std::fs::read_to_string(&config_path).context("Failed to read config file")?;
                let raw: serde_json::Value = match serde_json::from_str(&content) {
                    Ok(v) => v,
                    Err(e) => {
                        println!("[ERROR] Invalid JSON: {}", e);
                        return Ok(ExitCode::FAILURE);
                    }
                };
                diagnostics.extend(validate_config(&raw));
                serde_json::from_value::<Config>(raw).ok()
            } else {
                println!("[OK] No config file found (using defaults)");
                Some(Config::default())
            };

            if let Some(config) = config {
                diagnostics.extend(validate_services(&config));
            }

            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }

            Ok(if errors == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
