//! Integration tests for the git stages.
//!
//! These tests build real repositories with the git CLI, fetch them over
//! `file://` into bare storage, and check transcoding and ref publication
//! against what git itself reports.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use tempfile::TempDir;

use gh1000::core::cancel::CancellationFlag;
use gh1000::core::types::{ObjectKind, Oid};
use gh1000::git::loose::{loose_path, read_loose, write_loose};
use gh1000::git::{
    FetchError, Git, PackTranscoder, RefPublisher, RepositorySource, TranscodeError,
};

/// A source repository with a few commits, a side branch and a tag.
struct SourceRepo {
    dir: TempDir,
}

impl SourceRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");

        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);

        let repo = Self { dir };
        repo.commit_file("README.md", "# Test Repo\n", "Initial commit");
        repo.commit_file("src/lib.rs", "pub fn answer() -> u32 { 42 }\n", "Add lib");
        run_git(repo.path(), &["tag", "-a", "v1.0", "-m", "release"]);
        run_git(repo.path(), &["checkout", "-b", "feature"]);
        repo.commit_file("feature.txt", &"x".repeat(100_000), "Large file");
        run_git(repo.path(), &["checkout", "main"]);
        repo
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn url(&self) -> String {
        format!("file://{}", self.path().display())
    }

    fn commit_file(&self, path: &str, content: &str, message: &str) {
        let file = self.path().join(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(file, content).unwrap();
        run_git(self.path(), &["add", path]);
        run_git(self.path(), &["commit", "-m", message]);
    }

    fn rev_parse(&self, rev: &str) -> String {
        git_stdout(self.path(), &["rev-parse", rev]).trim().to_string()
    }
}

/// Bare storage a source is fetched into.
struct Storage {
    _dir: TempDir,
    path: PathBuf,
}

impl Storage {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("clone");
        Self { _dir: dir, path }
    }

    fn fetch(&self, source: &SourceRepo) {
        RepositorySource::new()
            .fetch(&source.url(), &self.path, &CancellationFlag::new())
            .expect("fetch failed");
    }

    /// Make sure everything sits in a single pack, as after a network clone.
    fn repack(&self) {
        run_git(&self.path, &["repack", "-a", "-d"]);
    }

    fn objects_dir(&self) -> PathBuf {
        self.path.join("objects")
    }

    fn pack_files(&self) -> Vec<PathBuf> {
        let pack_dir = self.objects_dir().join("pack");
        match fs::read_dir(&pack_dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().path())
                .filter(|p| p.extension().map_or(false, |e| e == "pack" || e == "idx"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Every object git can see: oid -> (kind, payload).
    fn all_objects(&self) -> BTreeMap<String, (String, Vec<u8>)> {
        let listing = git_stdout(
            &self.path,
            &[
                "cat-file",
                "--batch-all-objects",
                "--batch-check=%(objectname) %(objecttype)",
            ],
        );
        listing
            .lines()
            .map(|line| {
                let (oid, kind) = line.split_once(' ').unwrap();
                let payload = git_output(&self.path, &["cat-file", kind, oid]);
                (oid.to_string(), (kind.to_string(), payload))
            })
            .collect()
    }

    /// Loose object files and their modification times.
    fn loose_files(&self) -> BTreeMap<PathBuf, SystemTime> {
        let mut files = BTreeMap::new();
        for fanout in fs::read_dir(self.objects_dir()).unwrap() {
            let fanout = fanout.unwrap().path();
            let name = fanout.file_name().unwrap().to_string_lossy().to_string();
            if name.len() != 2 || !fanout.is_dir() {
                continue;
            }
            for file in fs::read_dir(&fanout).unwrap() {
                let file = file.unwrap().path();
                let mtime = fs::metadata(&file).unwrap().modified().unwrap();
                files.insert(file, mtime);
            }
        }
        files
    }
}

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

fn git_output(dir: &Path, args: &[&str]) -> Vec<u8> {
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
    output.stdout
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    String::from_utf8(git_output(dir, args)).unwrap()
}

// =============================================================================
// RepositorySource
// =============================================================================

#[test]
fn fetch_creates_bare_storage_with_remote_refs() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);

    let git = Git::open(&storage.path).unwrap();
    let refs: Vec<String> = git
        .direct_refs()
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert!(refs.contains(&"refs/remotes/origin/main".to_string()));
    assert!(refs.contains(&"refs/remotes/origin/feature".to_string()));
    assert!(refs.contains(&"refs/tags/v1.0".to_string()));
}

#[test]
fn refetch_without_changes_succeeds() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);

    let summary = RepositorySource::new()
        .fetch(&source.url(), &storage.path, &CancellationFlag::new())
        .unwrap();
    assert_eq!(summary.received_objects, 0);
    assert!(summary.up_to_date());
}

#[test]
fn refetch_picks_up_new_commits() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);

    source.commit_file("NEWS", "more\n", "Follow-up");
    storage.fetch(&source);

    let git = Git::open(&storage.path).unwrap();
    let main = git
        .direct_refs()
        .unwrap()
        .into_iter()
        .find(|r| r.name == "refs/remotes/origin/main")
        .unwrap();
    assert_eq!(main.oid.as_str(), source.rev_parse("main"));
}

#[test]
fn malformed_url_is_invalid_remote() {
    let storage = Storage::new();
    let err = RepositorySource::new()
        .fetch("not a url", &storage.path, &CancellationFlag::new())
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidRemote { .. }), "{err}");
}

#[test]
fn missing_source_fails() {
    let storage = Storage::new();
    let missing = TempDir::new().unwrap().path().join("nope");
    let result = RepositorySource::new().fetch(
        &format!("file://{}", missing.display()),
        &storage.path,
        &CancellationFlag::new(),
    );
    assert!(result.is_err());
}

#[test]
fn cancelled_fetch() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let err = RepositorySource::new()
        .fetch(&source.url(), &storage.path, &cancel)
        .unwrap_err();
    assert!(matches!(err, FetchError::Cancelled { .. }));
}

// =============================================================================
// PackTranscoder
// =============================================================================

#[test]
fn transcoded_objects_round_trip() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);
    storage.repack();
    assert!(!storage.pack_files().is_empty());

    let expected = storage.all_objects();
    assert!(!expected.is_empty());

    let summary = PackTranscoder::new()
        .materialize(&storage.path, &CancellationFlag::new())
        .unwrap();
    assert_eq!(summary.packs, 1);
    assert_eq!(summary.written, expected.len());
    assert!(storage.pack_files().is_empty(), "packs must be deleted");

    for (oid, (kind, payload)) in &expected {
        let oid = Oid::new(oid.as_str()).unwrap();
        assert!(loose_path(&storage.objects_dir(), &oid).exists());

        let loose = read_loose(&storage.objects_dir(), &oid).unwrap();
        assert_eq!(loose.kind, kind.parse::<ObjectKind>().unwrap(), "{oid}");
        assert_eq!(loose.size, payload.len() as u64, "{oid}");
        assert_eq!(&loose.payload, payload, "{oid}");
    }
}

#[test]
fn damaged_pack_is_corrupt_and_rolled_back() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);
    storage.repack();

    let packs_before = storage.pack_files();
    let pack = packs_before
        .iter()
        .find(|p| p.extension().map_or(false, |e| e == "pack"))
        .unwrap()
        .clone();
    let mut bytes = fs::read(&pack).unwrap();
    let mid = bytes.len() / 2;
    for byte in &mut bytes[mid..mid + 8] {
        *byte ^= 0xff;
    }
    // Packs are written read-only.
    let mut perms = fs::metadata(&pack).unwrap().permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(&pack, perms).unwrap();
    fs::write(&pack, &bytes).unwrap();

    let err = PackTranscoder::new()
        .materialize(&storage.path, &CancellationFlag::new())
        .unwrap_err();
    assert!(matches!(err, TranscodeError::CorruptObject { .. }), "{err:?}");

    assert!(storage.loose_files().is_empty(), "partial pack must be rolled back");
    let mut packs_after = storage.pack_files();
    packs_after.sort();
    let mut packs_before = packs_before;
    packs_before.sort();
    assert_eq!(packs_after, packs_before, "pack and index must be kept");
}

#[test]
fn transcoded_repository_passes_fsck() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);
    storage.repack();

    PackTranscoder::new()
        .materialize(&storage.path, &CancellationFlag::new())
        .unwrap();
    run_git(&storage.path, &["fsck", "--full"]);
}

#[test]
fn second_materialize_writes_nothing() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);
    storage.repack();

    let transcoder = PackTranscoder::new();
    let cancel = CancellationFlag::new();
    transcoder.materialize(&storage.path, &cancel).unwrap();
    let before = storage.loose_files();

    let summary = transcoder.materialize(&storage.path, &cancel).unwrap();
    assert_eq!(summary.packs, 0);
    assert_eq!(summary.written, 0);
    assert_eq!(storage.loose_files(), before);
}

#[test]
fn existing_loose_objects_are_skipped() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);
    storage.repack();

    // Materialize one packed object ahead of time; the transcoder must
    // leave that file alone.
    let head = source.rev_parse("main");
    let payload = git_output(&storage.path, &["cat-file", "commit", &head]);
    let oid = Oid::new(head.as_str()).unwrap();
    write_loose(
        &storage.objects_dir(),
        &oid,
        ObjectKind::Commit,
        payload.len() as u64,
        &mut payload.as_slice(),
    )
    .unwrap();
    let path = loose_path(&storage.objects_dir(), &oid);
    let mtime = fs::metadata(&path).unwrap().modified().unwrap();
    let total = storage.all_objects().len();

    let summary = PackTranscoder::new()
        .materialize(&storage.path, &CancellationFlag::new())
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written + summary.skipped, total);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime);
}

#[test]
fn incremental_fetch_then_transcode() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    let transcoder = PackTranscoder::new();
    let cancel = CancellationFlag::new();

    storage.fetch(&source);
    storage.repack();
    transcoder.materialize(&storage.path, &cancel).unwrap();

    source.commit_file("later.txt", "later\n", "Later");
    storage.fetch(&source);
    transcoder.materialize(&storage.path, &cancel).unwrap();

    let head = Oid::new(source.rev_parse("main")).unwrap();
    assert!(loose_path(&storage.objects_dir(), &head).exists());
    assert!(storage.pack_files().is_empty());
    run_git(&storage.path, &["fsck", "--full"]);
}

// =============================================================================
// RefPublisher
// =============================================================================

#[test]
fn manifest_rewrites_remote_tracking_refs() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);

    let records = RefPublisher::new()
        .publish(&storage.path, &CancellationFlag::new())
        .unwrap();
    let manifest = fs::read_to_string(storage.path.join("info/refs")).unwrap();

    let main_line = format!("{}\trefs/heads/main\n", source.rev_parse("main"));
    let feature_line = format!("{}\trefs/heads/feature\n", source.rev_parse("feature"));
    let tag_line = format!("{}\trefs/tags/v1.0\n", source.rev_parse("v1.0"));
    assert!(manifest.contains(&main_line), "{manifest}");
    assert!(manifest.contains(&feature_line), "{manifest}");
    assert!(manifest.contains(&tag_line), "{manifest}");
    assert!(!manifest.contains("refs/remotes/"));
    assert_eq!(records.len(), manifest.lines().count());
}

#[test]
fn manifest_is_deterministic() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);

    let publisher = RefPublisher::new();
    let cancel = CancellationFlag::new();
    publisher.publish(&storage.path, &cancel).unwrap();
    let first = fs::read(storage.path.join("info/refs")).unwrap();
    publisher.publish(&storage.path, &cancel).unwrap();
    let second = fs::read(storage.path.join("info/refs")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn head_points_at_published_branch() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    storage.fetch(&source);

    RefPublisher::new()
        .publish(&storage.path, &CancellationFlag::new())
        .unwrap();
    let head = fs::read_to_string(storage.path.join("HEAD")).unwrap();
    assert_eq!(head.trim(), "ref: refs/heads/main");
}

#[test]
fn full_local_pipeline_is_dumb_clonable() {
    let source = SourceRepo::new();
    let storage = Storage::new();
    let cancel = CancellationFlag::new();

    storage.fetch(&source);
    storage.repack();
    PackTranscoder::new()
        .materialize(&storage.path, &cancel)
        .unwrap();
    RefPublisher::new().publish(&storage.path, &cancel).unwrap();

    // Every object named in the manifest is present loose.
    let manifest = fs::read_to_string(storage.path.join("info/refs")).unwrap();
    for line in manifest.lines() {
        let (oid, _name) = line.split_once('\t').unwrap();
        let oid = Oid::new(oid).unwrap();
        assert!(loose_path(&storage.objects_dir(), &oid).exists(), "{oid}");
    }
    let packs = fs::read_to_string(storage.objects_dir().join("info/packs")).unwrap();
    assert!(packs.trim().is_empty());
}
