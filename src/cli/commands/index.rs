//! index commands - Print or reset the published index

use anyhow::{Context as _, Result};

use super::{load_config, record_settings, runtime};
use crate::cli::Context;
use crate::core::metadata::Index;
use crate::index::{encode, IndexStore};
use crate::store::KuboStore;
use crate::ui::output;

/// Print the published index document followed by a newline.
pub fn index_cat(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let store = KuboStore::new(config.api_url());

    let index = runtime()?.block_on(async {
        let index_store = IndexStore::connect(&store, record_settings(&config)).await?;
        index_store.retrieve().await
    })?;

    output::data(&encode(&index)).context("cannot write index")?;
    Ok(())
}

/// Publish an empty index.
pub fn index_purge(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let store = KuboStore::new(config.api_url());

    let cid = runtime()?.block_on(async {
        let index_store = IndexStore::connect(&store, record_settings(&config)).await?;
        index_store.save(&Index::new()).await
    })?;

    output::success(format!("published empty index {}", cid), ctx.verbosity);
    Ok(())
}
