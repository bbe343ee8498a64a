//! Index entry representation
//!
//! Each entry in the index represents a staged path with:
//! - The path, relative to the repository root and `/`-separated
//! - Content hash (object ID) and mode
//! - Stat metadata (size, timestamps, device/inode)
//! - A stage: 0 for a normal entry, 1-3 for the sides of an unresolved conflict
//!
//! ## Entry Format
//!
//! ```text
//! ctime mtime (sec, nsec each) dev ino mode uid gid size   10 x u32
//! object id                                                20 or 32 bytes
//! flags: stage << 12 | min(path length, 0xfff)             u16
//! path, NUL terminated and padded to a multiple of 8 bytes
//! ```
//!
//! Stat metadata is advisory: it only lets callers skip hashing unchanged files.

use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

/// Largest path length representable in the flags
const MAX_PATH_SIZE: usize = 0xfff;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Size of the fixed fields before the object id
const STAT_SIZE: usize = 40;

/// Smallest possible encoded entry (one-byte path) for an algorithm
pub fn entry_min_size(algorithm: HashAlgorithm) -> usize {
    (STAT_SIZE + algorithm.digest_len() + 2 + 2).next_multiple_of(ENTRY_BLOCK)
}

/// Conflict slot of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    #[default]
    Normal = 0,
    Ancestor = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub const CONFLICT_STAGES: [Stage; 3] = [Stage::Ancestor, Stage::Ours, Stage::Theirs];

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn is_conflict(&self) -> bool {
        *self != Stage::Normal
    }
}

impl TryFrom<u16> for Stage {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Stage::Normal),
            1 => Ok(Stage::Ancestor),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(Error::malformed(format!("invalid index stage {value}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IndexEntry {
    /// Path relative to the repository root
    pub path: String,
    pub oid: ObjectId,
    pub metadata: EntryMetadata,
    #[new(default)]
    pub stage: Stage,
}

impl IndexEntry {
    /// Entry for a conflict side, without stat data
    pub fn conflicted(path: impl Into<String>, oid: ObjectId, mode: EntryMode, stage: Stage) -> Self {
        IndexEntry {
            path: path.into(),
            oid,
            metadata: EntryMetadata::with_mode(mode),
            stage,
        }
    }

    pub fn mode(&self) -> EntryMode {
        self.metadata.mode
    }

    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Directories containing the entry, outermost first
    ///
    /// `a/b/c` gives `["a", "a/b"]`.
    pub fn parent_dirs(&self) -> Vec<&str> {
        self.path
            .match_indices('/')
            .map(|(position, _)| &self.path[..position])
            .collect()
    }

    /// Whether cached stat data still describes `other`
    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size)
            && self.metadata.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }

    fn flags(&self) -> u16 {
        (self.stage.as_u16() << 12) | self.path.len().min(MAX_PATH_SIZE) as u16
    }
}

/// File metadata stored in index entries
///
/// - `ctime`: File status change time (inode modification)
/// - `mtime`: File content modification time
///
/// Both include nanosecond precision. Values wider than 32 bits are
/// truncated when written, as the file format only stores 32 bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub ctime: i64,
    pub ctime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub dev: u64,
    pub ino: u64,
    pub mode: EntryMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

impl EntryMetadata {
    /// Metadata with no stat information, as for entries read from a tree
    pub fn with_mode(mode: EntryMode) -> Self {
        EntryMetadata {
            mode,
            ..Default::default()
        }
    }

    #[cfg(unix)]
    pub fn from_fs(metadata: &std::fs::Metadata, executable: bool) -> Self {
        use std::os::unix::fs::MetadataExt;

        let mode = if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else if executable {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };

        EntryMetadata {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_fs(metadata: &std::fs::Metadata, executable: bool) -> Self {
        let mode = if executable {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };

        EntryMetadata {
            size: metadata.len(),
            mode,
            ..Default::default()
        }
    }
}

impl Packable for IndexEntry {
    fn serialize(&self) -> Result<Bytes> {
        if self.path.is_empty() || self.path.contains('\0') {
            return Err(Error::InvalidArgument(format!(
                "invalid index path '{}'",
                self.path.escape_debug()
            )));
        }

        let mut entry_bytes = Vec::new();
        for field in [
            self.metadata.ctime as u32,
            self.metadata.ctime_nsec as u32,
            self.metadata.mtime as u32,
            self.metadata.mtime_nsec as u32,
            self.metadata.dev as u32,
            self.metadata.ino as u32,
            self.metadata.mode.as_u32(),
            self.metadata.uid,
            self.metadata.gid,
            self.metadata.size as u32,
        ] {
            entry_bytes.write_u32::<byteorder::NetworkEndian>(field)?;
        }
        self.oid.write_raw_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(self.flags())?;
        entry_bytes.write_all(self.path.as_bytes())?;

        // at least one NUL, then pad to ENTRY_BLOCK
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(bytes: Bytes, algorithm: HashAlgorithm) -> Result<Self> {
        if bytes.len() < entry_min_size(algorithm) {
            return Err(Error::malformed("index entry is truncated"));
        }

        let field = |index: usize| byteorder::NetworkEndian::read_u32(&bytes[index * 4..index * 4 + 4]);
        let oid_end = STAT_SIZE + algorithm.digest_len();
        let oid = ObjectId::from_bytes(&bytes[STAT_SIZE..oid_end])?;
        let flags = byteorder::NetworkEndian::read_u16(&bytes[oid_end..oid_end + 2]);

        let name_start = oid_end + 2;
        let name_len = bytes[name_start..]
            .iter()
            .position(|byte| *byte == 0)
            .ok_or_else(|| Error::malformed("missing NUL terminator in index entry path"))?;
        let path = std::str::from_utf8(&bytes[name_start..name_start + name_len])
            .map_err(|_| Error::malformed("index entry path is not valid UTF-8"))?
            .to_string();

        Ok(IndexEntry {
            path,
            oid,
            metadata: EntryMetadata {
                ctime: field(0) as i64,
                ctime_nsec: field(1) as i64,
                mtime: field(2) as i64,
                mtime_nsec: field(3) as i64,
                dev: field(4) as u64,
                ino: field(5) as u64,
                mode: EntryMode::try_from(field(6))?,
                uid: field(7),
                gid: field(8),
                size: field(9) as u64,
            },
            stage: Stage::try_from((flags >> 12) & 0x3)?,
        })
    }
}
