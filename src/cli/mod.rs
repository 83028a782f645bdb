//! cli
//!
//! Command-line interface layer for gh1000.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers
//!
//! The CLI layer is thin: handlers load configuration, build the store
//! client and hand off to [`crate::index`] or [`crate::engine`].

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::ui::output::Verbosity;

/// Settings shared by every command handler.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit configuration file.
    pub config: Option<PathBuf>,
    pub verbosity: Verbosity,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let ctx = Context {
        config: cli.config.clone(),
        verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
    };
    init_logging(ctx.verbosity);

    commands::dispatch(cli.command, &ctx)
}

/// Log to standard error. `RUST_LOG` overrides the verbosity default.
fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gh1000={}", verbosity.log_directive())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
