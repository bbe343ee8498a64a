//! Tree object
//!
//! Trees represent directory snapshots. They contain entries for files (blobs),
//! symlinks, submodules (gitlinks) and subdirectories (other trees).
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<raw-digest>`
//!
//! ## Ordering
//!
//! Entries are sorted by name, comparing directory names as if they ended in `/`.
//! The encoder sorts, so callers never control the on-disk order; the decoder
//! rejects anything not in strictly increasing order.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn object_type(&self) -> ObjectType {
        self.mode.object_type()
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    pub fn to_database_entry(&self) -> DatabaseEntry {
        DatabaseEntry::new(self.oid.clone(), self.mode)
    }
}

/// Compare two entry names the way trees are ordered
pub fn compare_entry_names(a: &str, a_is_tree: bool, b: &str, b_is_tree: bool) -> Ordering {
    let a_key = a.bytes().chain(a_is_tree.then_some(b'/'));
    let b_key = b.bytes().chain(b_is_tree.then_some(b'/'));

    a_key.cmp(b_key)
}

fn compare_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    compare_entry_names(&a.name, a.is_tree(), &b.name, b.is_tree())
}

/// Check that a name can appear as a single tree entry
pub fn validate_entry_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("empty entry name".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("reserved entry name '{name}'"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(format!("entry name '{}' contains '/' or NUL", name.escape_debug()));
    }

    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    /// Always sorted in tree order
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree from entries in any order
    ///
    /// Fails with `InvalidArgument` on duplicate or invalid names.
    pub fn from_entries(entries: impl IntoIterator<Item = TreeEntry>) -> Result<Self> {
        let mut entries = entries.into_iter().collect::<Vec<_>>();
        let mut names = BTreeSet::new();

        for entry in &entries {
            validate_entry_name(&entry.name).map_err(Error::InvalidArgument)?;
            if !names.insert(entry.name.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate tree entry '{}'",
                    entry.name
                )));
            }
        }

        entries.sort_by(compare_entries);
        Ok(Tree { entries })
    }

    pub fn entries(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = TreeEntry> {
        self.entries.into_iter()
    }

    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn display(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "{} {} {}\t{}",
                    entry.mode,
                    entry.object_type(),
                    entry.oid,
                    entry.name
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

impl Packable for Tree {
    fn serialize(&self) -> Result<Bytes> {
        let mut content_bytes = Vec::new();

        for entry in &self.entries {
            write!(content_bytes, "{} {}", entry.mode.as_str(), entry.name)?;
            content_bytes.push(0);
            entry.oid.write_raw_to(&mut content_bytes)?;
        }

        Ok(Bytes::from(content_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(data: Bytes, algorithm: HashAlgorithm) -> Result<Self> {
        let mut entries: Vec<TreeEntry> = Vec::new();
        let mut names = HashSet::new();
        let mut rest = &data[..];

        while !rest.is_empty() {
            // "mode "
            let space = rest
                .iter()
                .position(|byte| *byte == b' ')
                .ok_or_else(|| Error::malformed("unexpected end of tree entry mode"))?;
            let mode = std::str::from_utf8(&rest[..space])
                .map_err(|_| Error::malformed("tree entry mode is not ASCII"))?;
            let mode = EntryMode::from_octal_str(mode)?;
            rest = &rest[space + 1..];

            // "name\0"
            let nul = rest
                .iter()
                .position(|byte| *byte == 0)
                .ok_or_else(|| Error::malformed("unexpected end of tree entry name"))?;
            let name = std::str::from_utf8(&rest[..nul])
                .map_err(|_| Error::malformed("tree entry name is not valid UTF-8"))?
                .to_owned();
            validate_entry_name(&name).map_err(Error::Malformed)?;
            rest = &rest[nul + 1..];

            // raw digest
            if rest.len() < algorithm.digest_len() {
                return Err(Error::malformed("unexpected end of tree entry object id"));
            }
            let (oid, remainder) = rest.split_at(algorithm.digest_len());
            let oid = ObjectId::from_bytes(oid)?;
            rest = remainder;

            let entry = TreeEntry::new(name, mode, oid);
            if let Some(previous) = entries.last()
                && compare_entries(previous, &entry) != Ordering::Less
            {
                return Err(Error::malformed(format!(
                    "tree entries out of order: '{}' after '{}'",
                    entry.name, previous.name
                )));
            }
            if !names.insert(entry.name.clone()) {
                return Err(Error::malformed(format!(
                    "duplicate tree entry '{}'",
                    entry.name
                )));
            }

            entries.push(entry);
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}
