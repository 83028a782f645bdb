//! snapshot::multipart
//!
//! Streaming `multipart/form-data` encoding of a directory tree, in the
//! layout the IPFS RPC `add` endpoint expects for directory uploads.
//!
//! # Layout
//!
//! One part per entry, all named `file`, each `filename` being the entry's
//! path under the root name, URL-escaped:
//!
//! - directories: `Content-Type: application/x-directory`, empty body
//! - regular files: `Content-Type: application/octet-stream`, file contents
//! - symbolic links: `Content-Type: application/symlink`, the link target
//!
//! Parents always precede their children, which is what the walk's
//! pre-order guarantees.
//!
//! File contents are read in fixed-size chunks as the body is polled; the
//! current file is closed before the walk advances.

use std::io::{self, Read};

use bytes::{Bytes, BytesMut};

use super::walk::{EntryKind, TreeEntry, TreeWalk};

/// Size of the chunks file contents are read in.
pub const CHUNK_SIZE: usize = 64 * 1024;

const DIRECTORY_TYPE: &str = "application/x-directory";
const FILE_TYPE: &str = "application/octet-stream";
const SYMLINK_TYPE: &str = "application/symlink";

/// Generate a fresh multipart boundary.
pub fn new_boundary() -> String {
    format!("gh1000-{}", uuid::Uuid::new_v4().simple())
}

/// `Content-Type` header value for a body using `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

/// URL-escape a part file name.
pub fn escape_filename(name: &str) -> String {
    url::form_urlencoded::byte_serialize(name.as_bytes()).collect()
}

fn part_header(boundary: &str, filename: &str, content_type: &str) -> String {
    format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {content_type}\r\n\r\n",
        escape_filename(filename)
    )
}

/// Encode a single in-memory file as a complete multipart body.
pub fn single_part(boundary: &str, filename: &str, data: &[u8]) -> Bytes {
    let mut body = BytesMut::new();
    body.extend_from_slice(part_header(boundary, filename, FILE_TYPE).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body.freeze()
}

enum State {
    /// Between parts: pull the next walk entry.
    NextEntry,
    /// Copying the contents of the current file.
    Streaming(super::walk::TrackedFile),
    Done,
}

/// A lazily produced multipart body over a [`TreeWalk`].
///
/// Yields `io::Result<Bytes>` chunks. A walk failure is yielded as an
/// `io::Error` and ends the body without the closing delimiter, so the
/// receiving side sees a truncated request rather than a smaller tree.
pub struct MultipartBody {
    boundary: String,
    root_name: String,
    walk: TreeWalk,
    state: State,
    buf: Vec<u8>,
}

impl MultipartBody {
    /// Encode `walk` with every path placed under `root_name`.
    pub fn new(walk: TreeWalk, root_name: impl Into<String>, boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            root_name: root_name.into(),
            walk,
            state: State::NextEntry,
            buf: vec![0u8; CHUNK_SIZE],
        }
    }

    /// The boundary separating parts.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn filename(&self, entry: &TreeEntry) -> String {
        if entry.path.is_empty() {
            self.root_name.clone()
        } else {
            format!("{}/{}", self.root_name, entry.path)
        }
    }
}

impl Iterator for MultipartBody {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Done => None,
            State::NextEntry => match self.walk.next() {
                None => Some(Ok(Bytes::from(format!("--{}--\r\n", self.boundary)))),
                Some(Err(err)) => Some(Err(io::Error::new(io::ErrorKind::Other, err))),
                Some(Ok(entry)) => {
                    let filename = self.filename(&entry);
                    let mut chunk = BytesMut::new();
                    match entry.kind {
                        EntryKind::Directory => {
                            chunk.extend_from_slice(
                                part_header(&self.boundary, &filename, DIRECTORY_TYPE).as_bytes(),
                            );
                            chunk.extend_from_slice(b"\r\n");
                            self.state = State::NextEntry;
                        }
                        EntryKind::Symlink(target) => {
                            chunk.extend_from_slice(
                                part_header(&self.boundary, &filename, SYMLINK_TYPE).as_bytes(),
                            );
                            chunk.extend_from_slice(target.as_bytes());
                            chunk.extend_from_slice(b"\r\n");
                            self.state = State::NextEntry;
                        }
                        EntryKind::File(file) => {
                            chunk.extend_from_slice(
                                part_header(&self.boundary, &filename, FILE_TYPE).as_bytes(),
                            );
                            self.state = State::Streaming(file);
                        }
                    }
                    Some(Ok(chunk.freeze()))
                }
            },
            State::Streaming(mut file) => match file.read(&mut self.buf) {
                Ok(0) => {
                    drop(file);
                    self.state = State::NextEntry;
                    Some(Ok(Bytes::from_static(b"\r\n")))
                }
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&self.buf[..n]);
                    self.state = State::Streaming(file);
                    Some(Ok(chunk))
                }
                Err(err) => Some(Err(io::Error::new(
                    err.kind(),
                    format!("reading {}: {}", file.path().display(), err),
                ))),
            },
        }
    }
}
