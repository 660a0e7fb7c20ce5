//! Logging initialization for LEMPXpert.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output; events emitted through
//!   [`log_component!`] carry a `component` field (installer, renderer,
//!   controller, prober, orchestrator) for per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators
//!
//! Events go to stderr (or the configured file) so stdout stays free for
//! command output such as `test --json`.

use std::fs::{File, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber from config.
///
/// `RUST_LOG` takes precedence over `cfg.level`. A log file that cannot be
/// opened falls back to stderr. Calling this twice keeps the first
/// subscriber.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let file = cfg.file.as_deref().and_then(open_log_file);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match (cfg.format, file) {
        (LogFormat::Json, Some(file)) => builder.json().with_writer(Mutex::new(file)).try_init(),
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, Some(file)) => builder
            .pretty()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (LogFormat::Pretty, None) => builder.pretty().with_writer(std::io::stderr).try_init(),
        (LogFormat::Component, Some(file)) => builder
            .compact()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (LogFormat::Component, None) => builder.compact().with_writer(std::io::stderr).try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn open_log_file(path: &str) -> Option<File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}; logging to stderr", path, e);
            None
        }
    }
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`):
///
/// ```
/// # use lempxpert::log_component;
/// log_component!(info, "installer", "package installed");
/// log_component!(warn, "prober", "check failed", service = "nginx", attempt = 2u32);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
