//! Plan and render command handlers.

use anyhow::{Context, Result};

use lempxpert::ConfigRenderer;

use super::common::{load_config, load_plan};

/// Print the dependency-ordered plan.
pub(crate) fn cmd_plan() -> Result<()> {
    let config = load_config()?;
    let plan = load_plan(&config, &[])?;

    println!("Install plan");
    println!("============");
    for (i, spec) in plan.iter().enumerate() {
        let package = match &spec.package.version {
            Some(version) => format!("{} ({}*)", spec.package.name, version),
            None => spec.package.name.clone(),
        };
        println!("{}. {}", i + 1, spec.name);
        println!("     package:  {}", package);
        println!("     unit:     {}", spec.unit);
        println!("     config:   {}", spec.config_path.display());
        if !spec.depends_on.is_empty() {
            println!("     after:    {}", spec.depends_on.join(", "));
        }
        let checks: Vec<&str> = spec.checks.iter().map(|c| c.name.as_str()).collect();
        println!(
            "     checks:   {}",
            if checks.is_empty() {
                "none".to_string()
            } else {
                checks.join(", ")
            }
        );
    }
    Ok(())
}

/// Render config files into the staging directory. Live files are untouched.
pub(crate) fn cmd_render(only: Vec<String>) -> Result<()> {
    let config = load_config()?;
    let plan = load_plan(&config, &only)?;
    let renderer = ConfigRenderer::new(config.staging_dir());

    println!("Staging directory: {}", renderer.staging_dir().display());
    for spec in plan.iter() {
        let file = renderer
            .render(spec, &config.params)
            .with_context(|| format!("Failed to render {}", spec.name))?;
        println!(
            "  {:<10} {} (sha256 {})",
            file.service,
            file.staged_path.display(),
            &file.digest[..12]
        );
    }
    Ok(())
}
