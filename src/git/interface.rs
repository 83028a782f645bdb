//! git::interface
//!
//! Bare repository handle over git2.
//!
//! # Architecture
//!
//! The `Git` struct is the only way the rest of the `git` module touches a
//! repository. It exposes the object database and reference reads the
//! pipeline needs and normalizes git2 failures into [`GitError`].
//!
//! Working clones are always bare: the archive is the object store itself,
//! not a checkout.
//!
//! # Example
//!
//! ```ignore
//! use gh1000::git::Git;
//! use std::path::Path;
//!
//! let git = Git::init_or_open(Path::new("/var/lib/gh1000/github.com/a/b"))?;
//! for entry in git.direct_refs()? {
//!     println!("{}\t{}", entry.oid, entry.name);
//! }
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{ObjectKind, Oid, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Path exists but is not a repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Object not found in the object database.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// The object database returned an object type outside blob/tree/commit/tag.
    #[error("object {oid} has unsupported type {kind}")]
    UnsupportedKind {
        /// The object
        oid: String,
        /// The type git2 reported
        kind: String,
    },

    /// Stored object data failed an integrity check (zlib stream or hash).
    #[error("corrupt object data for {oid}: {message}")]
    CorruptData {
        /// The object being read
        oid: String,
        /// What libgit2 reported
        message: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with context.
    pub(super) fn from_git2(err: git2::Error, context: &str) -> Self {
        if is_data_corruption(&err) {
            return GitError::CorruptData {
                oid: context.to_string(),
                message: err.message().to_string(),
            };
        }
        match err.code() {
            git2::ErrorCode::NotFound => GitError::ObjectNotFound {
                oid: context.to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

/// Whether a git2 error means stored bytes are damaged, as opposed to the
/// storage being unreadable.
fn is_data_corruption(err: &git2::Error) -> bool {
    if err.class() == git2::ErrorClass::Zlib || err.code() == git2::ErrorCode::HashsumMismatch {
        return true;
    }
    let message = err.message();
    [
        "incorrect data check",
        "failed to inflate",
        "failed to decompress",
        "corrupt",
        "hash mismatch",
        "delta",
    ]
        .iter()
        .any(|needle| message.contains(needle))
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        GitError::InvalidOid {
            oid: err.to_string(),
        }
    }
}

/// A direct reference: a name pointing straight at an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// Full reference name (e.g. `refs/remotes/origin/main`)
    pub name: String,
    /// Target object
    pub oid: Oid,
}

/// Bare repository handle.
pub struct Git {
    repo: git2::Repository,
    git_dir: PathBuf,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git").field("git_dir", &self.git_dir).finish()
    }
}

impl Git {
    /// Open an existing bare repository at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotARepo`] if `path` is not a repository.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open_bare(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self::wrap(repo))
    }

    /// Open the bare repository at `path`, initializing it if the directory
    /// is missing or empty.
    pub fn init_or_open(path: &Path) -> Result<Self, GitError> {
        let is_empty = match std::fs::read_dir(path) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                return Err(GitError::AccessError {
                    message: format!("{}: {}", path.display(), e),
                })
            }
        };

        if is_empty {
            let repo = git2::Repository::init_bare(path)
                .map_err(|e| GitError::from_git2(e, &path.display().to_string()))?;
            Ok(Self::wrap(repo))
        } else {
            Self::open(path)
        }
    }

    fn wrap(repo: git2::Repository) -> Self {
        let git_dir = repo.path().to_path_buf();
        Self { repo, git_dir }
    }

    /// The repository directory (for a bare repository, the root itself).
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The `objects/` directory.
    pub fn objects_dir(&self) -> PathBuf {
        self.git_dir.join("objects")
    }

    /// The `objects/pack/` directory.
    pub fn pack_dir(&self) -> PathBuf {
        self.git_dir.join("objects").join("pack")
    }

    pub(super) fn repo(&self) -> &git2::Repository {
        &self.repo
    }

    /// List every direct reference. Symbolic references are skipped.
    pub fn direct_refs(&self) -> Result<Vec<RefEntry>, GitError> {
        let refs = self
            .repo
            .references()
            .map_err(|e| GitError::from_git2(e, "references"))?;

        let mut entries = Vec::new();
        for reference in refs {
            let reference = reference.map_err(|e| GitError::from_git2(e, "references"))?;

            if reference.kind() != Some(git2::ReferenceType::Direct) {
                continue;
            }
            let (Some(name), Some(target)) = (reference.name(), reference.target()) else {
                continue;
            };
            entries.push(RefEntry {
                name: name.to_string(),
                oid: Oid::from_bytes(target.as_bytes())?,
            });
        }
        Ok(entries)
    }

    /// Name the symbolic `HEAD` points at, if it is symbolic.
    pub fn head_target(&self) -> Option<String> {
        let head = self.repo.find_reference("HEAD").ok()?;
        head.symbolic_target().map(str::to_string)
    }

    /// Point `HEAD` at `refname`, which need not exist yet.
    pub fn set_head(&self, refname: &str) -> Result<(), GitError> {
        self.repo
            .set_head(refname)
            .map_err(|e| GitError::from_git2(e, refname))
    }

    /// Declared size and type of an object, without reading its payload.
    pub fn read_header(&self, oid: &Oid) -> Result<(usize, ObjectKind), GitError> {
        let odb = self.odb()?;
        let id = to_git2(oid)?;
        let (size, kind) = odb
            .read_header(id)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        Ok((size, from_git2_kind(oid, kind)?))
    }

    /// Read an object and hand its type and payload to `f`.
    ///
    /// The payload is borrowed from the object database's buffer, which is
    /// released when `f` returns.
    pub fn with_object<T>(
        &self,
        oid: &Oid,
        f: impl FnOnce(ObjectKind, &[u8]) -> T,
    ) -> Result<T, GitError> {
        let odb = self.odb()?;
        let id = to_git2(oid)?;
        let object = odb
            .read(id)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        let kind = from_git2_kind(oid, object.kind())?;
        Ok(f(kind, object.data()))
    }

    /// Compute the object id of `data` stored as `kind`.
    pub fn hash_object(kind: ObjectKind, data: &[u8]) -> Result<Oid, GitError> {
        let id = git2::Oid::hash_object(to_git2_kind(kind), data)
            .map_err(|e| GitError::from_git2(e, "hash"))?;
        Ok(Oid::from_bytes(id.as_bytes())?)
    }

    /// Make the object database rescan its backends after packs were
    /// removed or loose objects were added behind its back.
    pub fn refresh_odb(&self) -> Result<(), GitError> {
        self.odb()?
            .refresh()
            .map_err(|e| GitError::from_git2(e, "odb refresh"))
    }

    fn odb(&self) -> Result<git2::Odb<'_>, GitError> {
        self.repo.odb().map_err(|e| GitError::from_git2(e, "odb"))
    }
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|_| GitError::InvalidOid {
        oid: oid.to_string(),
    })
}

fn to_git2_kind(kind: ObjectKind) -> git2::ObjectType {
    match kind {
        ObjectKind::Blob => git2::ObjectType::Blob,
        ObjectKind::Tree => git2::ObjectType::Tree,
        ObjectKind::Commit => git2::ObjectType::Commit,
        ObjectKind::Tag => git2::ObjectType::Tag,
    }
}

fn from_git2_kind(oid: &Oid, kind: git2::ObjectType) -> Result<ObjectKind, GitError> {
    match kind {
        git2::ObjectType::Blob => Ok(ObjectKind::Blob),
        git2::ObjectType::Tree => Ok(ObjectKind::Tree),
        git2::ObjectType::Commit => Ok(ObjectKind::Commit),
        git2::ObjectType::Tag => Ok(ObjectKind::Tag),
        other => Err(GitError::UnsupportedKind {
            oid: oid.to_string(),
            kind: other.str().to_string(),
        }),
    }
}
