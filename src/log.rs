//! Logging setup for taskweave.
//!
//! Call sites use the `tracing` macros. `init_with_debug` installs a
//! subscriber that writes to `~/.taskweave/taskweave.log`, truncated at
//! startup.
//!
//! Log levels:
//! - ERROR: Critical failures that prevent operations from completing
//! - WARN: Task failures and other recoverable conditions
//! - INFO: Workflow lifecycle (submitted, started, finished)
//! - DEBUG: Wave and task traces
//!
//! Debug mode can be enabled with `--debug` flag or `TASKWEAVE_DEBUG=1` env
//! var. `RUST_LOG`, when set, overrides both.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initialize logging to ~/.taskweave/taskweave.log.
///
/// Returns the log file path, or `None` when no log file could be opened
/// or a subscriber was already installed.
pub fn init_with_debug(debug: bool) -> Option<PathBuf> {
    let debug_enabled = debug || env_debug();

    let dir = Config::taskweave_dir().ok()?;
    std::fs::create_dir_all(&dir).ok()?;
    let path = dir.join("taskweave.log");
    let file = File::create(&path).ok()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(debug_enabled))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .ok()?;
    Some(path)
}

fn env_debug() -> bool {
    std::env::var("TASKWEAVE_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

