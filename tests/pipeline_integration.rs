//! Integration tests for the orchestrator.
//!
//! Most tests drive the orchestrator with scripted local stages and the
//! in-memory store so failures can be injected at any stage. One test runs
//! the real git stages against `file://` repositories.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

use gh1000::core::cancel::CancellationFlag;
use gh1000::core::lock::WorkspaceLock;
use gh1000::core::types::RepoLink;
use gh1000::engine::{
    GitStages, LocalStages, Orchestrator, OrchestratorError, OrchestratorSettings, Stage,
    StageError,
};
use gh1000::git::TranscodeError;
use gh1000::index::{IndexStore, RecordSettings};
use gh1000::metadata::{Target, TargetsFile};
use gh1000::snapshot::SnapshotUploader;
use gh1000::store::memory::FailOn;
use gh1000::store::{MemoryStore, StoreError};

const KEY: &str = "gh1000";

// =============================================================================
// Fixtures
// =============================================================================

/// Local stages that fake a fetch by writing a small tree, and fail
/// transcoding for URLs containing a marker.
#[derive(Default)]
struct ScriptedStages {
    fail_transcode_for: Option<&'static str>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedStages {
    fn failing_transcode_for(marker: &'static str) -> Self {
        Self {
            fail_transcode_for: Some(marker),
            ..Self::default()
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl LocalStages for ScriptedStages {
    fn fetch(&self, url: &str, storage: &Path, _: &CancellationFlag) -> Result<(), StageError> {
        self.fetched.lock().unwrap().push(url.to_string());
        fs::create_dir_all(storage.join("objects/ab")).unwrap();
        fs::write(storage.join("objects/ab/cdef"), url.as_bytes()).unwrap();
        fs::write(storage.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        Ok(())
    }

    fn transcode(&self, storage: &Path, _: &CancellationFlag) -> Result<(), StageError> {
        let url = fs::read_to_string(storage.join("objects/ab/cdef")).unwrap();
        match self.fail_transcode_for {
            Some(marker) if url.contains(marker) => Err(TranscodeError::CorruptObject {
                pack: "pack-1234".into(),
                oid: gh1000::core::types::Oid::new("ab".repeat(20)).unwrap(),
                reason: "size mismatch".into(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn publish_refs(&self, storage: &Path, _: &CancellationFlag) -> Result<(), StageError> {
        fs::create_dir_all(storage.join("info")).unwrap();
        fs::write(storage.join("info/refs"), "").unwrap();
        Ok(())
    }
}

fn target(link: &str) -> Target {
    Target {
        link: RepoLink::new(link).unwrap(),
        url: Some(format!("https://example.com/{}", link)),
        rank: 1,
        stars: 10,
        last_metadata_fetch: Utc.with_ymd_and_hms(2022, 4, 5, 11, 40, 0).unwrap(),
    }
}

fn record_settings() -> RecordSettings {
    RecordSettings {
        key_name: KEY.into(),
        lifetime: Duration::from_secs(2400 * 3600),
        ttl: Duration::from_secs(3600),
    }
}

fn settings(workspace: &Path) -> OrchestratorSettings {
    OrchestratorSettings {
        workspace: workspace.to_path_buf(),
        keep_clones: true,
        record: record_settings(),
    }
}

fn link(s: &str) -> RepoLink {
    RepoLink::new(s).unwrap()
}

// =============================================================================
// Isolation
// =============================================================================

/// A seed whose shuffle of three sorted targets leaves the middle one in
/// second place.
fn seed_keeping_middle_second() -> u64 {
    (0u64..)
        .find(|&seed| {
            let mut order = vec![0, 1, 2];
            order.shuffle(&mut StdRng::seed_from_u64(seed));
            order[1] == 1
        })
        .unwrap()
}

#[tokio::test]
async fn failing_repository_does_not_stop_the_run() {
    let workspace = TempDir::new().unwrap();
    let store = MemoryStore::new().with_key(KEY);
    let targets = TargetsFile::from_targets(vec![target("a/one"), target("b/two"), target("c/three")]);
    let stages = ScriptedStages::failing_transcode_for("b/two");

    let orchestrator = Orchestrator::new(&store, &targets, &stages, settings(workspace.path()));
    let report = orchestrator
        .run(
            &mut StdRng::seed_from_u64(seed_keeping_middle_second()),
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

    // The failing repository is processed second, between the other two.
    let fetched = stages.fetched();
    assert_eq!(fetched.len(), 3);
    assert_eq!(fetched[1], "https://example.com/b/two");

    assert_eq!(report.archived.len(), 2);
    assert_eq!(report.failed.len(), 1);
    let failure = report.failure(&link("b/two")).unwrap();
    assert_eq!(failure.stage, Stage::Transcode);
    assert!(matches!(
        failure.error,
        StageError::Transcode(TranscodeError::CorruptObject { .. })
    ));

    // The published index holds exactly the archived repositories.
    let index_store = IndexStore::connect(&store, record_settings()).await.unwrap();
    let index = index_store.retrieve().await.unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.get(&link("a/one")).unwrap().is_archived());
    assert!(index.get(&link("c/three")).unwrap().is_archived());
    assert!(index.get(&link("b/two")).is_none());
    assert_eq!(store.published(KEY), report.index_cid);
}

#[tokio::test]
async fn upload_failure_is_reported_per_repository() {
    let workspace = TempDir::new().unwrap();
    let store = MemoryStore::new()
        .with_key(KEY)
        .fail_on(FailOn::AddTree(StoreError::Unavailable("connection refused".into())));
    let targets = TargetsFile::from_targets(vec![target("a/one"), target("b/two")]);
    let stages = ScriptedStages::default();

    let orchestrator = Orchestrator::new(&store, &targets, &stages, settings(workspace.path()));
    let report = orchestrator
        .run(&mut StdRng::seed_from_u64(3), &CancellationFlag::new())
        .await
        .unwrap();

    assert!(report.archived.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|f| f.stage == Stage::Upload));
    assert!(report.index_cid.is_none());
}

#[tokio::test]
async fn existing_index_entries_are_kept() {
    let workspace = TempDir::new().unwrap();
    let store = MemoryStore::new().with_key(KEY);

    let stages = ScriptedStages::default();
    let first = TargetsFile::from_targets(vec![target("a/one")]);
    Orchestrator::new(&store, &first, &stages, settings(workspace.path()))
        .run(&mut StdRng::seed_from_u64(0), &CancellationFlag::new())
        .await
        .unwrap();

    let second = TargetsFile::from_targets(vec![target("b/two")]);
    Orchestrator::new(&store, &second, &stages, settings(workspace.path()))
        .run(&mut StdRng::seed_from_u64(0), &CancellationFlag::new())
        .await
        .unwrap();

    let index_store = IndexStore::connect(&store, record_settings()).await.unwrap();
    let index = index_store.retrieve().await.unwrap();
    assert_eq!(index.len(), 2);
}

// =============================================================================
// Ordering, locking, cancellation
// =============================================================================

#[tokio::test]
async fn seeded_runs_process_in_the_same_order() {
    let links: Vec<String> = (0..12).map(|i| format!("org/repo{:02}", i)).collect();
    let targets = TargetsFile::from_targets(links.iter().map(|l| target(l)).collect());

    let mut orders = Vec::new();
    for _ in 0..2 {
        let workspace = TempDir::new().unwrap();
        let store = MemoryStore::new().with_key(KEY);
        let stages = ScriptedStages::default();
        Orchestrator::new(&store, &targets, &stages, settings(workspace.path()))
            .run(&mut StdRng::seed_from_u64(42), &CancellationFlag::new())
            .await
            .unwrap();
        orders.push(stages.fetched());
    }

    assert_eq!(orders[0], orders[1]);
    assert_eq!(orders[0].len(), links.len());
}

#[tokio::test]
async fn locked_workspace_refuses_to_run() {
    let workspace = TempDir::new().unwrap();
    let _held = WorkspaceLock::acquire(workspace.path()).unwrap();

    let store = MemoryStore::new().with_key(KEY);
    let targets = TargetsFile::from_targets(vec![target("a/one")]);
    let stages = ScriptedStages::default();
    let result = Orchestrator::new(&store, &targets, &stages, settings(workspace.path()))
        .run(&mut StdRng::seed_from_u64(0), &CancellationFlag::new())
        .await;

    assert!(matches!(result, Err(OrchestratorError::Lock(_))));
    assert!(stages.fetched().is_empty());
}

#[tokio::test]
async fn missing_key_stops_the_run() {
    let workspace = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let targets = TargetsFile::from_targets(vec![target("a/one")]);
    let stages = ScriptedStages::default();

    let result = Orchestrator::new(&store, &targets, &stages, settings(workspace.path()))
        .run(&mut StdRng::seed_from_u64(0), &CancellationFlag::new())
        .await;
    assert!(matches!(result, Err(OrchestratorError::Index(_))));
}

#[tokio::test]
async fn cancelled_run_processes_nothing() {
    let workspace = TempDir::new().unwrap();
    let store = MemoryStore::new().with_key(KEY);
    let targets = TargetsFile::from_targets(vec![target("a/one"), target("b/two")]);
    let stages = ScriptedStages::default();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let report = Orchestrator::new(&store, &targets, &stages, settings(workspace.path()))
        .run(&mut StdRng::seed_from_u64(0), &cancel)
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|f| f.error.is_cancelled()));
    assert!(stages.fetched().is_empty());
}

#[tokio::test]
async fn clones_removed_unless_kept() {
    let workspace = TempDir::new().unwrap();
    let store = MemoryStore::new().with_key(KEY);
    let targets = TargetsFile::from_targets(vec![target("a/one")]);
    let stages = ScriptedStages::default();

    let mut settings = settings(workspace.path());
    settings.keep_clones = false;
    let report = Orchestrator::new(&store, &targets, &stages, settings)
        .run(&mut StdRng::seed_from_u64(0), &CancellationFlag::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(!workspace.path().join("example.com/a/one").exists());
}

// =============================================================================
// Upload boundedness
// =============================================================================

#[tokio::test]
async fn large_tree_uploads_one_file_at_a_time() {
    let tree = TempDir::new().unwrap();
    for dir in 0..5 {
        let sub = tree.path().join(format!("d{}", dir));
        fs::create_dir_all(&sub).unwrap();
        for file in 0..20 {
            fs::write(sub.join(format!("f{}", file)), vec![dir as u8; 70_000 + file]).unwrap();
        }
    }

    let store = MemoryStore::new();
    let uploader = SnapshotUploader::new(&store);
    let cancel = CancellationFlag::new();

    let first = uploader.upload(tree.path(), &cancel).await.unwrap();
    let second = uploader.upload(tree.path(), &cancel).await.unwrap();

    assert_eq!(first.peak_open_files, 1);
    assert_eq!(first.cid, second.cid);
    assert!(store.is_pinned(&first.cid));
}

// =============================================================================
// Real git stages
// =============================================================================

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn source_repo(content: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    run_git(dir.path(), &["init", "-b", "main"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    run_git(dir.path(), &["config", "user.name", "Test User"]);
    fs::write(dir.path().join("README.md"), content).unwrap();
    run_git(dir.path(), &["add", "README.md"]);
    run_git(dir.path(), &["commit", "-m", "Initial commit"]);
    dir
}

#[tokio::test]
async fn git_pipeline_archives_local_repositories() {
    let one = source_repo("one\n");
    let two = source_repo("two\n");
    let missing = TempDir::new().unwrap();

    let mut good = target("local/one");
    good.url = Some(format!("file://{}", one.path().display()));
    let mut other = target("local/two");
    other.url = Some(format!("file://{}", two.path().display()));
    let mut broken = target("local/missing");
    broken.url = Some(format!("file://{}/absent", missing.path().display()));

    let workspace = TempDir::new().unwrap();
    let store = MemoryStore::new().with_key(KEY);
    let targets = TargetsFile::from_targets(vec![good, other, broken]);
    let stages = GitStages::new();

    let report = Orchestrator::new(&store, &targets, &stages, settings(workspace.path()))
        .run(&mut StdRng::seed_from_u64(9), &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.archived.len(), 2, "{report}");
    assert_eq!(report.failure(&link("local/missing")).unwrap().stage, Stage::Fetch);
    assert_ne!(report.archived[0].cid, report.archived[1].cid);

    let index_store = IndexStore::connect(&store, record_settings()).await.unwrap();
    let index = index_store.retrieve().await.unwrap();
    let archived = index.get(&link("local/one")).unwrap();
    assert!(archived.source_url.starts_with("file://"));
    assert!(store.is_pinned(archived.archive_ref.as_ref().unwrap()));
}
