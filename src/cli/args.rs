//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Read configuration from this file
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gh1000 - archive ranked git repositories into IPFS
#[derive(Parser, Debug)]
#[command(name = "gh1000")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: $GH1000_CONFIG, then the XDG and home locations)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or reset the published index
    #[command(
        name = "index",
        long_about = "Inspect or reset the published index.\n\n\
            The index maps each archived repository to its ranking metadata and \
            the content identifier of its snapshot. It is published under the \
            configured key as a mutable name record.",
        after_help = "\
EXAMPLES:
    # Print the current index document
    gh1000 index cat

    # Publish an empty index (the previous document stays pinned)
    gh1000 index purge"
    )]
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Archive every target repository and update the index
    #[command(
        name = "run",
        long_about = "Archive every target repository and update the index.\n\n\
            Each repository is fetched into the workspace, its packs are expanded \
            into loose objects, its refs are published for dumb-protocol clients, \
            and the tree is uploaded and pinned. The index is republished after \
            every repository. A failing repository does not stop the run; failures \
            are listed at the end and the command exits 1.",
        after_help = "\
EXAMPLES:
    # Archive the configured targets
    gh1000 run

    # Reproducible processing order
    gh1000 run --seed 42 --targets targets.json"
    )]
    Run {
        /// Targets file (overrides pipeline.targets)
        #[arg(long, value_name = "PATH")]
        targets: Option<PathBuf>,

        /// Seed for the processing order (overrides pipeline.seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    gh1000 completion bash > /etc/bash_completion.d/gh1000
    gh1000 completion zsh > \"${fpath[1]}/_gh1000\""
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Index subcommands.
#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Print the published index document
    Cat,
    /// Publish an empty index
    Purge,
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
