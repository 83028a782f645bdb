//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Oid`] - Git object identifier (SHA-1 or SHA-256 hex)
//! - [`Cid`] - Content identifier returned by the content-addressed store
//! - [`RepoLink`] - Repository identity, the unique key of the index
//! - [`ObjectKind`] - The four git object types
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use gh1000::core::types::{Cid, Oid, RepoLink};
//!
//! let oid = Oid::new("DEADBEEFdeadbeefdeadbeefdeadbeefdeadbeef").unwrap();
//! assert_eq!(oid.as_str(), "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef");
//!
//! let link = RepoLink::new("/torvalds/linux").unwrap();
//! assert_eq!(link.as_str(), "torvalds/linux");
//!
//! assert!(Cid::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").is_ok());
//! assert!(Cid::new("not a cid").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid content identifier: {0}")]
    InvalidCid(String),

    #[error("invalid repository link: {0}")]
    InvalidLink(String),

    #[error("unknown object type: {0}")]
    InvalidObjectKind(String),
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase for consistency.
///
/// # Example
///
/// ```
/// use gh1000::core::types::Oid;
///
/// let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
/// assert_eq!(oid.fanout(), "ab");
/// assert_eq!(oid.remainder(), "c123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// The OID is normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a valid hex OID.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// Build an OID from its raw digest bytes.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` unless `raw` is 20 or 32 bytes long.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, TypeError> {
        Self::new(hex::encode(raw))
    }

    /// The loose-object directory name: the first byte as two hex digits.
    pub fn fanout(&self) -> &str {
        &self.0[..2]
    }

    /// The loose-object file name: everything after the first byte.
    pub fn remainder(&self) -> &str {
        &self.0[2..]
    }

    /// Get an abbreviated form of the OID.
    ///
    /// Returns the first `len` characters. If `len` exceeds the OID length,
    /// returns the full OID.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A content identifier returned by the content-addressed store.
///
/// Identical content yields identical identifiers. The value is kept in the
/// textual form the store hands out (CIDv0 base58 or CIDv1 multibase); only
/// its shape is checked here, the store is the authority on its meaning.
///
/// An optional `/ipfs/` path prefix is stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    /// Create a new content identifier.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidCid` for empty or non-alphanumeric input.
    pub fn new(cid: impl Into<String>) -> Result<Self, TypeError> {
        let cid = cid.into();
        let trimmed = cid.trim();
        let bare = trimmed.strip_prefix("/ipfs/").unwrap_or(trimmed);

        if bare.len() < 2 {
            return Err(TypeError::InvalidCid(format!("'{}' is too short", cid)));
        }
        if !bare.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidCid(format!(
                "'{}' must be alphanumeric",
                cid
            )));
        }
        Ok(Self(bare.to_string()))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `/ipfs/<cid>` path form used by name records.
    pub fn ipfs_path(&self) -> String {
        format!("/ipfs/{}", self.0)
    }
}

impl TryFrom<String> for Cid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl AsRef<str> for Cid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Repository identity: the key of the published index (e.g. `"torvalds/linux"`).
///
/// Leading and trailing slashes are trimmed, so `"/a/b"` and `"a/b"` are the
/// same link. Ordering is bytewise, which is the order the index document
/// is written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoLink(String);

impl RepoLink {
    /// Create a new repository link.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidLink` if the link is empty or contains
    /// whitespace or control characters.
    pub fn new(link: impl Into<String>) -> Result<Self, TypeError> {
        let link = link.into();
        let trimmed = link.trim_matches('/');

        if trimmed.is_empty() {
            return Err(TypeError::InvalidLink("link cannot be empty".into()));
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(TypeError::InvalidLink(format!(
                "'{}' contains whitespace or control characters",
                link
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the link as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoLink {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoLink> for String {
    fn from(link: RepoLink) -> Self {
        link.0
    }
}

impl AsRef<str> for RepoLink {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type of a git object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    /// The type name as written in a loose object header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(TypeError::InvalidObjectKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
