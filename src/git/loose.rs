//! git::loose
//!
//! Loose object encoding.
//!
//! # Format
//!
//! A loose object is the zlib-compressed byte string
//! `<type> <size>\0<payload>` stored at `objects/<hash[0:2]>/<hash[2:]>`.
//!
//! # Invariants
//!
//! - An object is only committed to its final path after the full payload
//!   was written and the byte count matched the declared size
//! - An existing file at the target path is never rewritten
//! - Writes go through a temporary file in `objects/` and a no-clobber
//!   rename, so readers never observe a partial object

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::core::types::{ObjectKind, Oid};

/// Copy buffer size for streaming payloads into the encoder.
const COPY_CHUNK: usize = 64 * 1024;

/// Errors from reading or writing loose objects.
#[derive(Debug, Error)]
pub enum LooseError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("object {oid}: declared {declared} bytes, read {actual}")]
    SizeMismatch {
        oid: Oid,
        declared: u64,
        actual: u64,
    },

    #[error("malformed loose object {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Outcome of [`write_loose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new file was committed at this path.
    Written(PathBuf),
    /// A file already existed at the target path and was left untouched.
    AlreadyPresent,
}

/// A decoded loose object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseObject {
    pub kind: ObjectKind,
    pub size: u64,
    pub payload: Vec<u8>,
}

/// Path of the loose object `oid` under `objects_dir`.
pub fn loose_path(objects_dir: &Path, oid: &Oid) -> PathBuf {
    objects_dir.join(oid.fanout()).join(oid.remainder())
}

/// Encode and commit a loose object, streaming `payload` in bounded chunks.
///
/// Exactly `declared_size` bytes must be readable from `payload`; fewer or
/// more is a [`LooseError::SizeMismatch`] and nothing is committed.
pub fn write_loose<R: Read>(
    objects_dir: &Path,
    oid: &Oid,
    kind: ObjectKind,
    declared_size: u64,
    payload: &mut R,
) -> Result<WriteOutcome, LooseError> {
    let target = loose_path(objects_dir, oid);
    if target.exists() {
        return Ok(WriteOutcome::AlreadyPresent);
    }

    let fanout_dir = objects_dir.join(oid.fanout());
    fs::create_dir_all(&fanout_dir).map_err(io_at(&fanout_dir))?;

    let temp = NamedTempFile::new_in(objects_dir).map_err(io_at(objects_dir))?;
    let mut encoder = ZlibEncoder::new(BufWriter::new(temp), Compression::default());

    write!(encoder, "{} {}\0", kind.as_str(), declared_size).map_err(io_at(&target))?;

    // Read one byte past the declared size so an oversized payload is caught.
    let mut limited = payload.take(declared_size + 1);
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut actual: u64 = 0;
    loop {
        let n = limited.read(&mut buf).map_err(io_at(&target))?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n]).map_err(io_at(&target))?;
        actual += n as u64;
    }
    if actual != declared_size {
        return Err(LooseError::SizeMismatch {
            oid: oid.clone(),
            declared: declared_size,
            actual,
        });
    }

    let temp = encoder
        .finish()
        .map_err(io_at(&target))?
        .into_inner()
        .map_err(|e| LooseError::Io {
            path: target.clone(),
            source: e.into_error(),
        })?;
    temp.as_file().sync_all().map_err(io_at(&target))?;

    match temp.persist_noclobber(&target) {
        Ok(file) => {
            let mut perms = file.metadata().map_err(io_at(&target))?.permissions();
            perms.set_readonly(true);
            fs::set_permissions(&target, perms).map_err(io_at(&target))?;
            Ok(WriteOutcome::Written(target))
        }
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(WriteOutcome::AlreadyPresent)
        }
        Err(e) => Err(LooseError::Io {
            path: target,
            source: e.error,
        }),
    }
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> LooseError {
    let path = path.to_path_buf();
    move |source| LooseError::Io { path, source }
}

/// Read and decode the loose object `oid`.
pub fn read_loose(objects_dir: &Path, oid: &Oid) -> Result<LooseObject, LooseError> {
    let path = loose_path(objects_dir, oid);
    let file = fs::File::open(&path).map_err(|source| LooseError::Io {
        path: path.clone(),
        source,
    })?;

    let mut raw = Vec::new();
    ZlibDecoder::new(file)
        .read_to_end(&mut raw)
        .map_err(|source| LooseError::Io {
            path: path.clone(),
            source,
        })?;

    let malformed = |reason: &str| LooseError::Malformed {
        path: path.clone(),
        reason: reason.to_string(),
    };

    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| malformed("missing header terminator"))?;
    let header = std::str::from_utf8(&raw[..nul]).map_err(|_| malformed("header is not utf-8"))?;
    let (kind, size) = header
        .split_once(' ')
        .ok_or_else(|| malformed("header has no size"))?;
    let kind: ObjectKind = kind.parse().map_err(|_| malformed("unknown object type"))?;
    let size: u64 = size.parse().map_err(|_| malformed("size is not a number"))?;

    let payload = raw.split_off(nul + 1);
    if payload.len() as u64 != size {
        return Err(malformed("payload length differs from header"));
    }
    Ok(LooseObject {
        kind,
        size,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hello_oid() -> Oid {
        Oid::new("ce013625030ba8dba906f756967f9e9ca394464a").unwrap()
    }

    #[test]
    fn path_uses_fanout() {
        let path = loose_path(Path::new("/o"), &hello_oid());
        assert_eq!(
            path,
            Path::new("/o/ce/013625030ba8dba906f756967f9e9ca394464a")
        );
    }

    #[test]
    fn write_then_read() {
        let temp = TempDir::new().unwrap();
        let oid = hello_oid();

        let outcome =
            write_loose(temp.path(), &oid, ObjectKind::Blob, 6, &mut &b"hello\n"[..]).unwrap();
        assert!(matches!(outcome, WriteOutcome::Written(_)));

        let object = read_loose(temp.path(), &oid).unwrap();
        assert_eq!(object.kind, ObjectKind::Blob);
        assert_eq!(object.size, 6);
        assert_eq!(object.payload, b"hello\n");
    }

    #[test]
    fn existing_path_left_untouched() {
        let temp = TempDir::new().unwrap();
        let oid = hello_oid();
        let path = loose_path(temp.path(), &oid);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"sentinel").unwrap();

        let outcome =
            write_loose(temp.path(), &oid, ObjectKind::Blob, 6, &mut &b"hello\n"[..]).unwrap();
        assert_eq!(outcome, WriteOutcome::AlreadyPresent);
        assert_eq!(fs::read(&path).unwrap(), b"sentinel");
    }

    #[test]
    fn short_payload_commits_nothing() {
        let temp = TempDir::new().unwrap();
        let oid = hello_oid();

        let result = write_loose(temp.path(), &oid, ObjectKind::Blob, 10, &mut &b"hello\n"[..]);
        assert!(matches!(
            result,
            Err(LooseError::SizeMismatch {
                declared: 10,
                actual: 6,
                ..
            })
        ));
        assert!(!loose_path(temp.path(), &oid).exists());
    }

    #[test]
    fn long_payload_commits_nothing() {
        let temp = TempDir::new().unwrap();
        let oid = hello_oid();

        let result = write_loose(temp.path(), &oid, ObjectKind::Blob, 3, &mut &b"hello\n"[..]);
        assert!(matches!(result, Err(LooseError::SizeMismatch { .. })));
        assert!(!loose_path(temp.path(), &oid).exists());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let oid = hello_oid();
        let _ = write_loose(temp.path(), &oid, ObjectKind::Blob, 99, &mut &b"x"[..]);
        write_loose(temp.path(), &oid, ObjectKind::Blob, 6, &mut &b"hello\n"[..]).unwrap();

        let stray: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().unwrap().is_file())
            .collect();
        assert!(stray.is_empty());
    }
}
