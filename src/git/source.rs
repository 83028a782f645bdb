//! git::source
//!
//! RepositorySource: clone or incrementally fetch a remote into a bare
//! working clone.
//!
//! # Behavior
//!
//! - An empty storage directory is initialized as a bare repository
//! - The URL is registered as the sole remote, `origin`
//! - All branches land under `refs/remotes/origin/*`, all tags under
//!   `refs/tags/*`, with unrestricted depth
//! - "Already up to date" is success
//!
//! Repeated calls against the same storage pick up new commits.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, instrument};

use super::interface::{Git, GitError};
use crate::core::cancel::CancellationFlag;

/// Name of the single remote of a working clone.
pub const REMOTE_NAME: &str = "origin";

/// Refspecs fetched from the remote.
pub const FETCH_REFSPECS: &[&str] = &[
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// URL schemes a remote may use.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "git", "ssh", "file"];

/// Errors from fetching a repository.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or DNS failure while talking to the remote.
    #[error("source unreachable: {url}: {message}")]
    SourceUnreachable { url: String, message: String },

    /// The URL is malformed, or the remote rejected it.
    #[error("invalid remote {url}: {reason}")]
    InvalidRemote { url: String, reason: String },

    /// The remote sent data the transport or indexer could not accept.
    #[error("protocol error fetching {url}: {message}")]
    SourceProtocol { url: String, message: String },

    /// The local storage could not be prepared.
    #[error("cannot prepare storage for {url}")]
    Storage {
        url: String,
        #[source]
        source: GitError,
    },

    /// Cancellation was requested while fetching.
    #[error("fetch of {url} cancelled")]
    Cancelled { url: String },
}

/// Counters reported by a completed fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Objects received from the remote (0 when already up to date).
    pub received_objects: usize,
    /// Bytes received from the remote.
    pub received_bytes: usize,
}

impl FetchSummary {
    /// Whether the fetch transferred nothing.
    pub fn up_to_date(&self) -> bool {
        self.received_objects == 0
    }
}

/// Fetches remote repositories into local bare storage.
#[derive(Debug, Clone, Default)]
pub struct RepositorySource;

impl RepositorySource {
    pub fn new() -> Self {
        Self
    }

    /// Fetch every ref and object of `url` into `storage`.
    ///
    /// # Errors
    ///
    /// See [`FetchError`]. Cancellation is observed at transfer progress
    /// callbacks, so an in-flight network call finishes its current chunk
    /// first.
    #[instrument(skip(self, storage, cancel), fields(url = %url))]
    pub fn fetch(
        &self,
        url: &str,
        storage: &Path,
        cancel: &CancellationFlag,
    ) -> Result<FetchSummary, FetchError> {
        validate_url(url)?;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        let git = Git::init_or_open(storage).map_err(|source| FetchError::Storage {
            url: url.to_string(),
            source,
        })?;
        let repo = git.repo();

        let storage_err = |e: git2::Error| FetchError::Storage {
            url: url.to_string(),
            source: GitError::from_git2(e, "remote"),
        };

        // Exactly one remote, pointing at `url`.
        let names = repo.remotes().map_err(storage_err)?;
        for name in names.iter().flatten() {
            if name != REMOTE_NAME {
                repo.remote_delete(name).map_err(storage_err)?;
            }
        }
        match repo.find_remote(REMOTE_NAME) {
            Ok(existing) => {
                if existing.url() != Some(url) {
                    debug!(previous = ?existing.url(), "updating remote url");
                    repo.remote_set_url(REMOTE_NAME, url).map_err(storage_err)?;
                }
            }
            Err(_) => {
                repo.remote(REMOTE_NAME, url).map_err(storage_err)?;
            }
        }
        let mut remote = repo.find_remote(REMOTE_NAME).map_err(storage_err)?;

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.transfer_progress(|_progress| !cancel.is_cancelled());
        callbacks.sideband_progress(|_data| !cancel.is_cancelled());

        let mut options = git2::FetchOptions::new();
        options
            .remote_callbacks(callbacks)
            .download_tags(git2::AutotagOption::All)
            .prune(git2::FetchPrune::On)
            .update_fetchhead(false);

        if let Err(err) = remote.fetch(FETCH_REFSPECS, Some(&mut options), None) {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    url: url.to_string(),
                });
            }
            return Err(classify(url, &err));
        }

        let stats = remote.stats();
        let summary = FetchSummary {
            received_objects: stats.received_objects(),
            received_bytes: stats.received_bytes(),
        };
        if summary.up_to_date() {
            info!("already up to date");
        } else {
            info!(
                objects = summary.received_objects,
                bytes = summary.received_bytes,
                "fetched"
            );
        }
        Ok(summary)
    }
}

/// Reject URLs that cannot name a remote repository.
pub fn validate_url(url: &str) -> Result<(), FetchError> {
    let invalid = |reason: String| FetchError::InvalidRemote {
        url: url.to_string(),
        reason,
    };

    let parsed = url::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.scheme() != "file" && parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Map a git2 fetch failure onto the fetch error taxonomy.
fn classify(url: &str, err: &git2::Error) -> FetchError {
    let url = url.to_string();
    let message = err.message().to_string();

    match err.code() {
        git2::ErrorCode::User => return FetchError::Cancelled { url },
        git2::ErrorCode::Auth | git2::ErrorCode::Certificate | git2::ErrorCode::NotFound => {
            return FetchError::InvalidRemote {
                url,
                reason: message,
            }
        }
        _ => {}
    }

    match err.class() {
        git2::ErrorClass::Net | git2::ErrorClass::Ssl | git2::ErrorClass::Os => {
            FetchError::SourceUnreachable { url, message }
        }
        git2::ErrorClass::Http => {
            if is_client_rejection(&message) {
                FetchError::InvalidRemote {
                    url,
                    reason: message,
                }
            } else {
                FetchError::SourceUnreachable { url, message }
            }
        }
        git2::ErrorClass::Invalid | git2::ErrorClass::Config | git2::ErrorClass::Ssh => {
            FetchError::InvalidRemote {
                url,
                reason: message,
            }
        }
        _ => FetchError::SourceProtocol { url, message },
    }
}

/// Whether an HTTP failure message carries a 4xx status.
fn is_client_rejection(message: &str) -> bool {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|tok| tok.parse::<u16>().ok())
        .any(|status| (400..500).contains(&status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_schemes() {
        assert!(validate_url("https://github.com/rust-lang/rust").is_ok());
        assert!(validate_url("git://example.com/repo.git").is_ok());
        assert!(validate_url("file:///tmp/repo").is_ok());
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            validate_url("not a url"),
            Err(FetchError::InvalidRemote { .. })
        ));
        assert!(matches!(
            validate_url("ftp://example.com/repo"),
            Err(FetchError::InvalidRemote { .. })
        ));
        assert!(matches!(
            validate_url("https://"),
            Err(FetchError::InvalidRemote { .. })
        ));
    }

    #[test]
    fn http_status_detection() {
        assert!(is_client_rejection("unexpected http status code: 404"));
        assert!(is_client_rejection("request failed with status 403"));
        assert!(!is_client_rejection("unexpected http status code: 502"));
        assert!(!is_client_rejection("connection reset"));
    }

    #[test]
    fn user_code_means_cancelled() {
        let err = git2::Error::new(
            git2::ErrorCode::User,
            git2::ErrorClass::Callback,
            "callback returned false",
        );
        assert!(matches!(
            classify("https://x/y", &err),
            FetchError::Cancelled { .. }
        ));
    }

    #[test]
    fn network_class_means_unreachable() {
        let err = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Net,
            "failed to resolve address",
        );
        assert!(matches!(
            classify("https://x/y", &err),
            FetchError::SourceUnreachable { .. }
        ));
    }

    #[test]
    fn indexer_class_means_protocol() {
        let err = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Indexer,
            "pack checksum mismatch",
        );
        assert!(matches!(
            classify("https://x/y", &err),
            FetchError::SourceProtocol { .. }
        ));
    }

    #[test]
    fn cancelled_before_start() {
        let temp = tempfile::TempDir::new().unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result = RepositorySource::new().fetch("https://example.com/a/b", temp.path(), &cancel);
        assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    }
}
