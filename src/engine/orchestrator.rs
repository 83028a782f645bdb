//! engine::orchestrator
//!
//! Runs the pipeline over every target repository.
//!
//! Metadata for all targets is gathered up front, before any clone work
//! starts. Each repository then moves through its state machine on its own;
//! the index is retrieved, merged and republished right after each upload,
//! so the published index tracks progress through the run.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::report::{ArchivedRepo, FailedRepo, RunReport};
use super::stages::LocalStages;
use super::state::{RepoState, Stage};
use super::StageError;
use crate::core::cancel::CancellationFlag;
use crate::core::lock::{LockError, WorkspaceLock};
use crate::core::metadata::RepoMetadata;
use crate::core::types::{Cid, RepoLink};
use crate::index::{IndexError, IndexStore, RecordSettings};
use crate::metadata::{MetadataError, MetadataSource};
use crate::snapshot::SnapshotUploader;
use crate::store::ContentStore;

/// Host directory used for URLs without a host (`file://`).
const LOCAL_HOST_DIR: &str = "local";

/// Errors that stop a run before any repository is processed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("cannot list target repositories: {0}")]
    Metadata(#[from] MetadataError),
}

/// Run parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Directory holding working clones and the run lock.
    pub workspace: PathBuf,
    /// Keep working clones after a repository reaches a terminal state.
    pub keep_clones: bool,
    /// Name record the index is published under.
    pub record: RecordSettings,
}

/// Sequences the pipeline for every target repository.
pub struct Orchestrator<'a> {
    store: &'a dyn ContentStore,
    metadata: &'a dyn MetadataSource,
    stages: &'a dyn LocalStages,
    settings: OrchestratorSettings,
}

/// Metadata gathered for one target, or why it could not be.
type Target = (RepoLink, Result<RepoMetadata, MetadataError>);

/// Tracks one repository through its state machine.
struct Progress<'l> {
    link: &'l RepoLink,
    state: RepoState,
}

impl<'l> Progress<'l> {
    fn new(link: &'l RepoLink) -> Self {
        Self {
            link,
            state: RepoState::Pending,
        }
    }

    fn advance(&mut self, next: RepoState) {
        debug_assert!(
            self.state.can_become(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(link = %self.link, from = %self.state, to = %next, "state");
        self.state = next;
    }

    /// Stage that was running when the current state was left in error.
    fn failing_stage(&self) -> Stage {
        self.state.next_stage().unwrap_or(Stage::IndexUpdate)
    }
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        metadata: &'a dyn MetadataSource,
        stages: &'a dyn LocalStages,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            metadata,
            stages,
            settings,
        }
    }

    /// Process every target once, in an order drawn from `rng`.
    ///
    /// Repository failures are collected in the report; only failures that
    /// affect the whole run (lock, key lookup, listing targets) are errors.
    pub async fn run<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        cancel: &CancellationFlag,
    ) -> Result<RunReport, OrchestratorError> {
        let _lock = WorkspaceLock::acquire(&self.settings.workspace)?;
        let index = IndexStore::connect(self.store, self.settings.record.clone()).await?;

        let mut targets = self.collect_metadata().await?;
        targets.shuffle(rng);
        info!(
            repos = targets.len(),
            source = self.metadata.name(),
            store = self.store.name(),
            "starting run"
        );

        let mut report = RunReport::default();
        for (link, metadata) in targets {
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(%link, error = %err, "no metadata");
                    report.failed.push(FailedRepo {
                        link,
                        stage: Stage::Metadata,
                        error: err.into(),
                    });
                    continue;
                }
            };

            if cancel.is_cancelled() {
                report.failed.push(FailedRepo {
                    link,
                    stage: Stage::Fetch,
                    error: StageError::Cancelled,
                });
                continue;
            }

            match self.archive(&index, &link, metadata, cancel).await {
                Ok((cid, index_cid)) => {
                    report.archived.push(ArchivedRepo { link, cid });
                    report.index_cid = Some(index_cid);
                }
                Err((stage, error)) => {
                    warn!(%link, %stage, error = %error, "repository failed");
                    report.failed.push(FailedRepo { link, stage, error });
                }
            }
        }

        info!(
            archived = report.archived.len(),
            failed = report.failed.len(),
            "run finished"
        );
        Ok(report)
    }

    /// Gather metadata for every distinct target before any clone work.
    async fn collect_metadata(&self) -> Result<Vec<Target>, MetadataError> {
        let links: BTreeSet<RepoLink> = self.metadata.list_links().await?.into_iter().collect();
        let mut targets = Vec::with_capacity(links.len());
        for link in links {
            let metadata = self.metadata.fetch(&link).await;
            targets.push((link, metadata));
        }
        Ok(targets)
    }

    /// Take one repository to a terminal state. Returns the snapshot and
    /// index identifiers, or the failing stage.
    #[instrument(skip_all, fields(link = %link, url = %metadata.source_url))]
    async fn archive(
        &self,
        index: &IndexStore<'_>,
        link: &RepoLink,
        metadata: RepoMetadata,
        cancel: &CancellationFlag,
    ) -> Result<(Cid, Cid), (Stage, StageError)> {
        let storage = clone_path(&self.settings.workspace, &metadata.source_url, link);
        let mut progress = Progress::new(link);

        let result = self
            .run_stages(&mut progress, index, &storage, metadata, cancel)
            .await;

        if !self.settings.keep_clones {
            if let Err(err) = remove_clone(&storage) {
                warn!(path = %storage.display(), error = %err, "cannot remove working clone");
            }
        }

        result.map_err(|error| {
            let stage = progress.failing_stage();
            progress.advance(RepoState::Failed(stage));
            (stage, error)
        })
    }

    async fn run_stages(
        &self,
        progress: &mut Progress<'_>,
        index: &IndexStore<'_>,
        storage: &Path,
        metadata: RepoMetadata,
        cancel: &CancellationFlag,
    ) -> Result<(Cid, Cid), StageError> {
        fs::create_dir_all(storage).map_err(|source| StageError::Workspace {
            path: storage.to_path_buf(),
            source,
        })?;

        self.stages.fetch(&metadata.source_url, storage, cancel)?;
        progress.advance(RepoState::Fetched);

        cancel.checkpoint()?;
        self.stages.transcode(storage, cancel)?;
        progress.advance(RepoState::Transcoded);

        cancel.checkpoint()?;
        self.stages.publish_refs(storage, cancel)?;
        progress.advance(RepoState::RefsPublished);

        let snapshot = SnapshotUploader::new(self.store)
            .upload(storage, cancel)
            .await?;
        progress.advance(RepoState::Uploaded(snapshot.cid.clone()));

        cancel.checkpoint()?;
        let mut current = index.retrieve_or_empty().await?;
        current.insert(
            progress.link.clone(),
            metadata.with_archive(snapshot.cid.clone()),
        );
        let index_cid = index.save(&current).await?;
        progress.advance(RepoState::Archived(snapshot.cid.clone()));

        info!(cid = %snapshot.cid, "archived");
        Ok((snapshot.cid, index_cid))
    }
}

/// Working clone location for a repository: `<workspace>/<host>/<path>`.
///
/// Dot segments are dropped so the result always stays inside
/// `workspace`. URLs that cannot be parsed fall back to the link.
pub fn clone_path(workspace: &Path, source_url: &str, link: &RepoLink) -> PathBuf {
    let (host, path) = match Url::parse(source_url) {
        Ok(url) => (
            url.host_str()
                .filter(|h| !h.is_empty())
                .unwrap_or(LOCAL_HOST_DIR)
                .to_string(),
            url.path().to_string(),
        ),
        Err(_) => (LOCAL_HOST_DIR.to_string(), link.as_str().to_string()),
    };

    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    let mut dir = workspace.join(host);
    if segments.is_empty() {
        dir.extend(link.as_str().split('/').filter(|s| !s.is_empty() && *s != ".."));
    } else {
        dir.extend(segments);
    }
    dir
}

fn remove_clone(storage: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(storage) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
