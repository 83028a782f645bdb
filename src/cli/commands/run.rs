//! run command - Archive every target repository

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use super::{load_config, record_settings, runtime};
use crate::cli::Context;
use crate::core::cancel::CancellationFlag;
use crate::engine::{GitStages, Orchestrator, OrchestratorSettings};
use crate::metadata::TargetsFile;
use crate::store::KuboStore;
use crate::ui::output;

/// Run the pipeline over the configured targets.
///
/// Exits with an error if any repository failed, after printing the report.
pub fn run(ctx: &Context, targets: Option<PathBuf>, seed: Option<u64>) -> Result<()> {
    let config = load_config(ctx)?;

    let targets_path = match targets.or_else(|| config.targets().map(PathBuf::from)) {
        Some(path) => path,
        None => bail!("no targets file: pass --targets or set pipeline.targets"),
    };
    let targets = TargetsFile::load(&targets_path)?;

    let mut rng = match seed.or(config.seed()) {
        Some(seed) => {
            info!(seed, "using fixed processing order");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };

    let store = KuboStore::new(config.api_url());
    let stages = GitStages::new();
    let settings = OrchestratorSettings {
        workspace: config.workspace(),
        keep_clones: config.keep_clones(),
        record: record_settings(&config),
    };
    let orchestrator = Orchestrator::new(&store, &targets, &stages, settings);

    let cancel = CancellationFlag::new();
    let report = runtime()?.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping after the current step");
                on_interrupt.cancel();
            }
        });
        orchestrator.run(&mut rng, &cancel).await
    })?;

    output::print(&report, ctx.verbosity);
    if !report.is_success() {
        bail!(
            "{} of {} repositories failed",
            report.failed.len(),
            report.total()
        );
    }
    Ok(())
}
