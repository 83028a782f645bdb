//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! Commands that talk to the store are async because they involve network
//! I/O. Each handler builds a tokio runtime and blocks on its async body.

mod completion;
mod index;
mod run;

pub use completion::completion;
pub use index::{index_cat, index_purge};
pub use run::run;

use anyhow::{Context as _, Result};
use tracing::debug;

use super::args::{Command, IndexAction};
use super::Context;
use crate::core::config::Config;
use crate::index::RecordSettings;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Index { action } => match action {
            IndexAction::Cat => index_cat(ctx),
            IndexAction::Purge => index_purge(ctx),
        },
        Command::Run { targets, seed } => run(ctx, targets, seed),
        Command::Completion { shell } => completion(shell),
    }
}

/// Load configuration for a command.
fn load_config(ctx: &Context) -> Result<Config> {
    let loaded = Config::load(ctx.config.as_deref()).context("cannot load configuration")?;
    match &loaded.path {
        Some(path) => debug!(path = %path.display(), "configuration loaded"),
        None => debug!("no configuration file; using defaults"),
    }
    Ok(loaded.config)
}

/// Name record parameters from configuration.
fn record_settings(config: &Config) -> RecordSettings {
    RecordSettings {
        key_name: config.key_name().to_string(),
        lifetime: config.record_lifetime(),
        ttl: config.record_ttl(),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("cannot start async runtime")
}
