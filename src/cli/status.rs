//! Status command handler.

use std::sync::Arc;

use anyhow::{Context, Result};

use lempxpert::installer::Registry;
use lempxpert::runtime::{CommandRunner, NativeRunner};
use lempxpert::supervisor::{create_supervisor, ControlTimeouts};
use lempxpert::ServiceController;

use super::common::{load_config, load_plan};

/// Show recorded installs and what the supervisor reports per service.
pub(crate) async fn cmd_status() -> Result<()> {
    let config = load_config()?;
    let plan = load_plan(&config, &[])?;
    let registry_path = config.registry_path();
    let registry = Registry::load(&registry_path)
        .with_context(|| format!("Failed to read {}", registry_path.display()))?;

    let runner: Arc<dyn CommandRunner> = Arc::new(NativeRunner::new());
    let controller = ServiceController::new(
        create_supervisor(config.supervisor, runner.clone()),
        runner,
        ControlTimeouts {
            start: config.timeouts.start(),
            stop: config.timeouts.stop(),
            command: config.timeouts.command(),
        },
    );

    println!("LEMPXpert Status");
    println!("================");
    println!();
    println!("Config:      {}", lempxpert::Config::path().display());
    println!("State dir:   {}", config.state_dir().display());
    println!("Supervisor:  {}", controller.supervisor_name());
    println!();

    for spec in plan.iter() {
        let installed = match registry.get(&spec.name) {
            Some(entry) => format!(
                "{} {} (installed {})",
                entry.package,
                entry.version,
                entry.installed_at.format("%Y-%m-%d %H:%M")
            ),
            None => "not installed by lempxpert".to_string(),
        };
        let state = controller.refresh(spec).await;
        println!("  {:<10} {:<9} {}", spec.name, state, installed);
    }
    Ok(())
}
