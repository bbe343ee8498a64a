//! Index file format
//!
//! The index (also called staging area or cache) records what the next commit
//! will contain, plus stat data used to detect working tree changes cheaply.
//!
//! ## File Format (Version 2)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Each entry padded with NUL bytes to 8-byte alignment
//!   - Stage stored in bits 12-13 of the flags
//!
//! Checksum (20 or 32 bytes):
//!   - Digest of all preceding bytes, using the repository's hash algorithm
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Size of index header in bytes
pub const HEADER_SIZE: usize = 12;

/// Magic signature identifying index files
pub const SIGNATURE: &[u8; 4] = b"DIRC";

/// Index file format version
pub const VERSION: u32 = 2;
