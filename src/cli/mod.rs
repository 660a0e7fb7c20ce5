//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod common;
pub mod config;
pub mod install;
pub mod menu;
pub mod plan;
pub mod status;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Exit code when the install pipeline halted on a failure.
pub(crate) const EXIT_INSTALL_FAILED: u8 = 2;
/// Exit code when a test pass found an unhealthy service.
pub(crate) const EXIT_TEST_FAILED: u8 = 3;

#[derive(Parser)]
#[command(name = "lempxpert")]
#[command(version)]
#[command(about = "LEMP server manager: install, configure and verify nginx, php-fpm and mysql", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default when no command is given)
    Menu,
    /// Install, configure and start the stack in dependency order
    Install {
        /// Restrict the run to these services and their dependencies
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// Run every health check without changing anything
    Test {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Restrict the pass to these services
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// Show the dependency-ordered install plan
    Plan,
    /// Render config files into the staging directory without promoting them
    Render {
        /// Restrict rendering to these services
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// Show installed packages and supervisor state per service
    Status,
    /// Validate configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Check configuration for errors and warnings
    Check,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<ExitCode> {
    // Load config early so we can respect the logging settings; fall back to
    // defaults if the config file is missing or unreadable.
    let logging_cfg = lempxpert::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    lempxpert::utils::logging::init_logging(&logging_cfg);

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Menu) => menu::cmd_menu().await,
        Some(Commands::Install { only }) => install::cmd_install(only).await,
        Some(Commands::Test { json, only }) => test::cmd_test(json, only).await,
        Some(Commands::Plan) => {
            plan::cmd_plan()?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Render { only }) => {
            plan::cmd_render(only)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Status) => {
            status::cmd_status().await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config { action }) => config::cmd_config(action),
        Some(Commands::Version) => {
            cmd_version();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_version() {
    println!("lempxpert {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("LEMP server manager");
    println!(
        "Supervisors: {}",
        lempxpert::supervisor::available_supervisors().join(", ")
    );
}
