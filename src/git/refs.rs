//! git::refs
//!
//! RefPublisher: write the flat reference manifest dumb-protocol clients
//! read instead of negotiating refs.
//!
//! # Output
//!
//! - `info/refs`: one `<hash>\t<refName>\n` line per direct reference,
//!   with `refs/remotes/<remote>/` rewritten to `refs/heads/`
//! - `objects/info/packs`: one `P <pack>\n` line per remaining pack
//!
//! Lines are sorted by reference name so the manifest is byte-stable for a
//! given set of references.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

use super::interface::{Git, GitError};
use crate::core::cancel::CancellationFlag;
use crate::core::types::Oid;

const REMOTES_PREFIX: &str = "refs/remotes/";
const HEADS_PREFIX: &str = "refs/heads/";

/// Branches `HEAD` is pointed at, in order of preference, when its current
/// target is not published.
const DEFAULT_BRANCHES: &[&str] = &["refs/heads/main", "refs/heads/master"];

/// Errors from publishing references.
#[derive(Debug, Error)]
pub enum RefsError {
    #[error("cannot read references of {path}")]
    Git {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    #[error("cannot write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("publishing references of {path} cancelled")]
    Cancelled { path: PathBuf },
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefRecord {
    pub name: String,
    pub oid: Oid,
}

impl RefRecord {
    /// The manifest line for this record, newline included.
    pub fn manifest_line(&self) -> String {
        format!("{}\t{}\n", self.oid, self.name)
    }
}

/// Rewrite a remote-tracking name to the local branch name it mirrors.
///
/// `refs/remotes/origin/main` becomes `refs/heads/main`; other names are
/// returned unchanged.
pub fn local_ref_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix(REMOTES_PREFIX) {
        if let Some((_remote, branch)) = rest.split_once('/') {
            return format!("{}{}", HEADS_PREFIX, branch);
        }
    }
    name.to_string()
}

/// Writes reference manifests.
#[derive(Debug, Clone, Default)]
pub struct RefPublisher;

impl RefPublisher {
    pub fn new() -> Self {
        Self
    }

    /// Write `info/refs` and `objects/info/packs` for the repository at
    /// `storage`, returning the published records.
    #[instrument(skip(self, cancel), fields(storage = %storage.display()))]
    pub fn publish(
        &self,
        storage: &Path,
        cancel: &CancellationFlag,
    ) -> Result<Vec<RefRecord>, RefsError> {
        let git_err = |source: GitError| RefsError::Git {
            path: storage.to_path_buf(),
            source,
        };
        if cancel.is_cancelled() {
            return Err(RefsError::Cancelled {
                path: storage.to_path_buf(),
            });
        }

        let git = Git::open(storage).map_err(git_err)?;
        let mut records: Vec<RefRecord> = git
            .direct_refs()
            .map_err(git_err)?
            .into_iter()
            .map(|entry| RefRecord {
                name: local_ref_name(&entry.name),
                oid: entry.oid,
            })
            .collect();
        records.sort();

        let manifest: String = records.iter().map(RefRecord::manifest_line).collect();
        write_atomic(&git.git_dir().join("info").join("refs"), manifest.as_bytes())?;

        let packs = pack_list(&git.pack_dir())?;
        write_atomic(
            &git.objects_dir().join("info").join("packs"),
            packs.as_bytes(),
        )?;

        align_head(&git, &records).map_err(git_err)?;

        debug!(refs = records.len(), "published ref manifest");
        Ok(records)
    }
}

/// Point `HEAD` at a published branch when its target is not published.
fn align_head(git: &Git, records: &[RefRecord]) -> Result<(), GitError> {
    let published = |name: &str| records.iter().any(|r| r.name == name);
    if git.head_target().is_some_and(|target| published(target.as_str())) {
        return Ok(());
    }

    let fallback = DEFAULT_BRANCHES
        .iter()
        .copied()
        .find(|&name| published(name))
        .or_else(|| {
            records
                .iter()
                .map(|r| r.name.as_str())
                .find(|name| name.starts_with(HEADS_PREFIX))
        });
    match fallback {
        Some(name) => git.set_head(name),
        None => Ok(()),
    }
}

/// `P <pack>\n` lines for every pack still present, sorted.
fn pack_list(pack_dir: &Path) -> Result<String, RefsError> {
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
        Err(source) => {
            return Err(RefsError::Io {
                path: pack_dir.to_path_buf(),
                source,
            })
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".pack"))
        .collect();
    names.sort();
    Ok(names.iter().map(|n| format!("P {}\n", n)).collect())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), RefsError> {
    let io_err = |source: io::Error| RefsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    temp.write_all(contents).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
