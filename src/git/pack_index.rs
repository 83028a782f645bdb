//! git::pack_index
//!
//! Reader for pack index (`.idx`) files.
//!
//! Only the object names are needed to enumerate a pack, so offsets and
//! CRCs are skipped. Both layouts are supported:
//!
//! - v1: 256-entry fanout table, then `(offset, name)` pairs
//! - v2: `\377tOc` magic, version, fanout table, then the sorted name table
//!
//! Names are read with a fixed hash width (20 bytes for SHA-1 repositories,
//! 32 for SHA-256).

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use thiserror::Error;

use crate::core::types::Oid;

/// Magic bytes opening a v2 index.
const V2_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];

/// Hash width of SHA-1 repositories.
pub const SHA1_LEN: usize = 20;

/// Errors from reading a pack index.
#[derive(Debug, Error)]
pub enum PackIndexError {
    #[error("cannot read pack index: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported pack index version {0}")]
    UnsupportedVersion(u32),

    #[error("malformed pack index: {0}")]
    Malformed(String),
}

/// Read every object name listed in the pack index at `path`.
pub fn read_pack_index(path: &Path, hash_len: usize) -> Result<Vec<Oid>, PackIndexError> {
    let file = File::open(path)?;
    parse(BufReader::new(file), hash_len)
}

/// Parse a pack index from `reader`.
pub fn parse<R: Read>(mut reader: R, hash_len: usize) -> Result<Vec<Oid>, PackIndexError> {
    let mut head = [0u8; 4];
    reader.read_exact(&mut head).map_err(truncated)?;

    let (version, first_fanout) = if head == V2_MAGIC {
        let version = read_u32(&mut reader)?;
        if version != 2 {
            return Err(PackIndexError::UnsupportedVersion(version));
        }
        (2, read_u32(&mut reader)?)
    } else {
        (1, u32::from_be_bytes(head))
    };

    // The fanout table is cumulative; its last entry is the object count.
    let mut previous = first_fanout;
    for _ in 1..256 {
        let value = read_u32(&mut reader)?;
        if value < previous {
            return Err(PackIndexError::Malformed(
                "fanout table is not monotonic".to_string(),
            ));
        }
        previous = value;
    }
    let count = previous as usize;

    let mut names = Vec::with_capacity(count);
    let mut raw = vec![0u8; hash_len];
    for _ in 0..count {
        if version == 1 {
            // Skip the 4-byte pack offset preceding each name.
            read_u32(&mut reader)?;
        }
        reader.read_exact(&mut raw).map_err(truncated)?;
        let oid = Oid::from_bytes(&raw)
            .map_err(|e| PackIndexError::Malformed(e.to_string()))?;
        names.push(oid);
    }

    if names.windows(2).any(|w| w[0] >= w[1]) {
        return Err(PackIndexError::Malformed(
            "object names are not strictly sorted".to_string(),
        ));
    }
    Ok(names)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, PackIndexError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(truncated)?;
    Ok(u32::from_be_bytes(buf))
}

fn truncated(err: io::Error) -> PackIndexError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        PackIndexError::Malformed("truncated".to_string())
    } else {
        PackIndexError::Io(err)
    }
}
