//! Index (staging area)
//!
//! The index tracks what goes into the next commit. Entries are keyed by
//! `(path, stage)`: a path either has a single stage-0 entry, or up to three
//! conflict entries (ancestor, ours, theirs) left behind by a merge.
//!
//! ## Index File Format
//!
//! - Header: `DIRC` signature, version 2 and the entry count
//! - Entries, sorted by path then stage
//! - Checksum over everything before it, using the repository hash algorithm

use crate::areas::database::Database;
use crate::areas::workspace::WorkingTree;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{
    ENTRY_BLOCK, EntryMetadata, IndexEntry, Stage, entry_min_size,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::HEADER_SIZE;
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree_builder::{TreeBuilder, split_path};
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The sides recorded for one conflicted path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSides {
    pub ancestor: Option<IndexEntry>,
    pub ours: Option<IndexEntry>,
    pub theirs: Option<IndexEntry>,
}

impl ConflictSides {
    fn set(&mut self, entry: IndexEntry) {
        match entry.stage {
            Stage::Ancestor => self.ancestor = Some(entry),
            Stage::Ours => self.ours = Some(entry),
            Stage::Theirs => self.theirs = Some(entry),
            Stage::Normal => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Index {
    /// Index file, `None` for an index that is never persisted
    path: Option<Box<Path>>,
    algorithm: HashAlgorithm,
    entries: BTreeMap<(String, Stage), IndexEntry>,
    changed: bool,
}

impl Index {
    pub fn new(path: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Self {
        Index {
            path: Some(path.into().into_boxed_path()),
            algorithm,
            entries: BTreeMap::new(),
            changed: false,
        }
    }

    pub fn in_memory(algorithm: HashAlgorithm) -> Self {
        Index {
            path: None,
            algorithm,
            entries: BTreeMap::new(),
            changed: false,
        }
    }

    /// Open the index file at `path`, reading it when it exists
    pub fn load(path: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Result<Self> {
        let mut index = Self::new(path, algorithm);
        index.read()?;
        Ok(index)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Stage the current content of `path` from the working tree
    pub fn add(
        &mut self,
        path: &str,
        workspace: &dyn WorkingTree,
        database: &Database,
    ) -> Result<ObjectId> {
        split_path(path)?;

        let content = workspace.read_file(path)?;
        let metadata = workspace.stat_file(path)?;
        let oid = database.put(ObjectType::Blob, &content)?;

        self.add_entry(IndexEntry::new(path.to_string(), oid.clone(), metadata))?;

        Ok(oid)
    }

    /// Upsert a stage-0 entry, dropping conflicts and anything it replaces
    pub fn add_entry(&mut self, entry: IndexEntry) -> Result<()> {
        split_path(&entry.path)?;
        if entry.stage.is_conflict() {
            return Err(Error::InvalidArgument(format!(
                "'{}' must be added with add_conflict",
                entry.path
            )));
        }

        self.discard_conflicts(&entry.path);
        self.entries.insert((entry.path.clone(), Stage::Normal), entry);
        self.changed = true;

        Ok(())
    }

    /// Replace the entries of `path` with the given conflict sides
    pub fn add_conflict(
        &mut self,
        path: &str,
        ancestor: Option<DatabaseEntry>,
        ours: Option<DatabaseEntry>,
        theirs: Option<DatabaseEntry>,
    ) -> Result<()> {
        split_path(path)?;
        if ancestor.is_none() && ours.is_none() && theirs.is_none() {
            return Err(Error::InvalidArgument(format!(
                "conflict for '{path}' needs at least one side"
            )));
        }

        self.discard_conflicts(path);
        for (side, stage) in [ancestor, ours, theirs].into_iter().zip(Stage::CONFLICT_STAGES) {
            if let Some(side) = side {
                let entry = IndexEntry::conflicted(path, side.oid, side.mode, stage);
                self.entries.insert((path.to_string(), stage), entry);
            }
        }
        self.changed = true;

        Ok(())
    }

    /// Remove every entry for `path` and below it
    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.entries.len();

        self.remove_path(path);
        self.remove_children(path);

        let removed = self.entries.len() != before;
        self.changed |= removed;
        removed
    }

    /// Files in the way of `path`, `path` itself at any stage, and entries below it
    fn discard_conflicts(&mut self, path: &str) {
        for (position, _) in path.match_indices('/') {
            self.remove_path(&path[..position]);
        }
        self.remove_path(path);
        self.remove_children(path);
    }

    fn remove_path(&mut self, path: &str) {
        for stage in [Stage::Normal, Stage::Ancestor, Stage::Ours, Stage::Theirs] {
            self.entries.remove(&(path.to_string(), stage));
        }
    }

    fn remove_children(&mut self, path: &str) {
        let prefix = format!("{path}/");
        let children = self
            .entries
            .range((prefix.clone(), Stage::Normal)..)
            .take_while(|((name, _), _)| name.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        for key in children {
            self.entries.remove(&key);
        }
    }

    pub fn entry(&self, path: &str, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_string(), stage))
    }

    /// All entries in path then stage order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Whether `path` is a tracked file or a directory holding tracked files
    pub fn is_tracked(&self, path: &str) -> bool {
        let prefix = format!("{path}/");

        self.entries.keys().any(|(name, _)| name == path || name.starts_with(&prefix))
    }

    pub fn conflicts(&self) -> BTreeMap<String, ConflictSides> {
        let mut conflicts = BTreeMap::<String, ConflictSides>::new();

        for entry in self.entries.values().filter(|entry| entry.stage.is_conflict()) {
            conflicts.entry(entry.path.clone()).or_default().set(entry.clone());
        }

        conflicts
    }

    pub fn conflicted_paths(&self) -> Vec<String> {
        self.conflicts().into_keys().collect()
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|(_, stage)| stage.is_conflict())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.changed |= !self.entries.is_empty();
        self.entries.clear();
    }

    pub fn update_entry_stat(&mut self, path: &str, stat: EntryMetadata) {
        if let Some(entry) = self.entries.get_mut(&(path.to_string(), Stage::Normal)) {
            entry.metadata = stat;
            self.changed = true;
        }
    }

    /// Replace the contents with the files of a tree
    pub fn read_tree(&mut self, database: &Database, tree_oid: &ObjectId) -> Result<()> {
        let tree_oid = database.peel_to_tree(tree_oid)?;
        let files = database.flatten_tree(&tree_oid)?;

        self.entries = files
            .into_iter()
            .map(|(path, entry)| {
                let index_entry =
                    IndexEntry::new(path.clone(), entry.oid, EntryMetadata::with_mode(entry.mode));
                ((path, Stage::Normal), index_entry)
            })
            .collect();
        self.changed = true;

        debug!(tree = %tree_oid, entries = self.entries.len(), "read tree into index");
        Ok(())
    }

    /// Store the tree graph described by the stage-0 entries
    pub fn write_tree(&self, database: &Database) -> Result<ObjectId> {
        if self.has_conflicts() {
            return Err(Error::Conflict(self.conflicted_paths()));
        }

        let mut builder = TreeBuilder::new(database, None)?;
        for entry in self.entries.values() {
            builder.insert(&entry.path, entry.oid.clone(), entry.mode())?;
        }

        let oid = builder.write()?;
        debug!(tree = %oid, entries = self.entries.len(), "wrote index tree");

        Ok(oid)
    }

    /// Reload from the index file; a missing file reads as empty
    pub fn read(&mut self) -> Result<()> {
        self.entries.clear();
        self.changed = false;

        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let mut file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(());
        }

        let lock = file_guard::lock(&mut file, file_guard::Lock::Shared, 0, 1)?;
        let mut reader = Checksum::new(lock, self.algorithm);

        let header = IndexHeader::deserialize(reader.read(HEADER_SIZE)?, self.algorithm)?;
        header.validate()?;

        for _ in 0..header.entries_count {
            let entry = self.read_entry(&mut reader)?;
            self.entries.insert((entry.path.clone(), entry.stage), entry);
        }
        reader.verify()?;

        debug!(path = %path.display(), entries = self.entries.len(), "read index");
        Ok(())
    }

    fn read_entry(&self, reader: &mut Checksum) -> Result<IndexEntry> {
        let mut entry_bytes = reader.read(entry_min_size(self.algorithm))?.to_vec();

        while entry_bytes.last() != Some(&0) {
            entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
        }

        IndexEntry::deserialize(Bytes::from(entry_bytes), self.algorithm)
    }

    /// Persist to the index file
    pub fn write(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            self.changed = false;
            return Ok(());
        };

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let lock = file_guard::lock(&mut file, file_guard::Lock::Exclusive, 0, 1)?;
        lock.set_len(0)?;

        let mut writer = Checksum::new(lock, self.algorithm);
        writer.write(&IndexHeader::with_entries(self.entries.len() as u32).serialize()?)?;
        for entry in self.entries.values() {
            writer.write(&entry.serialize()?)?;
        }
        writer.write_checksum()?;
        self.changed = false;

        debug!(path = %path.display(), entries = self.entries.len(), "wrote index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::workspace::MemoryWorkspace;
    use crate::artifacts::index::entry_mode::EntryMode;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> Database {
        Database::in_memory(HashAlgorithm::Sha1)
    }

    fn entry(path: &str, content: &[u8]) -> IndexEntry {
        IndexEntry::new(
            path.to_string(),
            HashAlgorithm::Sha1.digest(content),
            EntryMetadata::with_mode(EntryMode::REGULAR),
        )
    }

    fn side(content: &[u8]) -> Option<DatabaseEntry> {
        Some(DatabaseEntry::new(HashAlgorithm::Sha1.digest(content), EntryMode::REGULAR))
    }

    fn paths(index: &Index) -> Vec<&str> {
        index.entries().map(|entry| entry.path.as_str()).collect()
    }

    #[rstest]
    fn add_reads_through_the_working_tree(database: Database) {
        let workspace = MemoryWorkspace::with_files([("dir/file.txt", "hello\n")]);
        let mut index = Index::in_memory(HashAlgorithm::Sha1);

        let oid = index.add("dir/file.txt", &workspace, &database).unwrap();

        assert_eq!(database.get(&oid).unwrap().data.as_ref(), b"hello\n");
        assert_eq!(index.entry("dir/file.txt", Stage::Normal).unwrap().oid, oid);
        assert_eq!(
            index.entry("dir/file.txt", Stage::Normal).unwrap().metadata.size,
            6
        );
    }

    #[rstest]
    fn replacing_a_file_with_a_directory() {
        let mut index = Index::in_memory(HashAlgorithm::Sha1);
        index.add_entry(entry("alice.txt", b"a")).unwrap();
        index.add_entry(entry("bob.txt", b"b")).unwrap();

        index.add_entry(entry("alice.txt/nested.txt", b"n")).unwrap();

        assert_eq!(paths(&index), vec!["alice.txt/nested.txt", "bob.txt"]);
    }

    #[rstest]
    fn replacing_a_directory_with_a_file() {
        let mut index = Index::in_memory(HashAlgorithm::Sha1);
        index.add_entry(entry("alice.txt", b"a")).unwrap();
        index.add_entry(entry("nested/bob.txt", b"b")).unwrap();
        index.add_entry(entry("nested/inner/claire.txt", b"c")).unwrap();

        index.add_entry(entry("nested", b"file")).unwrap();

        assert_eq!(paths(&index), vec!["alice.txt", "nested"]);
    }

    #[rstest]
    fn conflicts_replace_and_are_replaced_by_normal_entries() {
        let mut index = Index::in_memory(HashAlgorithm::Sha1);
        index.add_entry(entry("file", b"base")).unwrap();

        index.add_conflict("file", side(b"base"), side(b"ours"), side(b"theirs")).unwrap();

        assert!(index.entry("file", Stage::Normal).is_none());
        assert!(index.has_conflicts());
        let sides = index.conflicts().remove("file").unwrap();
        assert_eq!(sides.ours.unwrap().oid, HashAlgorithm::Sha1.digest(b"ours"));

        index.add_entry(entry("file", b"resolved")).unwrap();

        assert!(!index.has_conflicts());
        assert_eq!(index.len(), 1);
    }

    #[rstest]
    fn conflicts_need_a_side() {
        let mut index = Index::in_memory(HashAlgorithm::Sha1);

        assert!(matches!(
            index.add_conflict("file", None, None, None),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn remove_takes_every_stage_and_children() {
        let mut index = Index::in_memory(HashAlgorithm::Sha1);
        index.add_conflict("dir/a", None, side(b"ours"), side(b"theirs")).unwrap();
        index.add_entry(entry("dir/b", b"b")).unwrap();
        index.add_entry(entry("dirt", b"d")).unwrap();

        assert!(index.remove("dir"));
        assert!(!index.remove("dir"));
        assert_eq!(paths(&index), vec!["dirt"]);
    }

    #[rstest]
    fn write_tree_refuses_conflicts(database: Database) {
        let mut index = Index::in_memory(HashAlgorithm::Sha1);
        index.add_conflict("b", None, side(b"ours"), None).unwrap();
        index.add_entry(entry("a", b"a")).unwrap();

        let err = index.write_tree(&database).unwrap_err();

        assert!(matches!(err, Error::Conflict(paths) if paths == vec!["b".to_string()]));
    }

    #[rstest]
    fn write_tree_then_read_tree_keeps_entries(database: Database) {
        let workspace = MemoryWorkspace::with_files([("a.txt", "a"), ("lib/b.rs", "b"), ("lib/sub/c.rs", "c")]);
        let mut index = Index::in_memory(HashAlgorithm::Sha1);
        for path in ["a.txt", "lib/b.rs", "lib/sub/c.rs"] {
            index.add(path, &workspace, &database).unwrap();
        }

        let tree = index.write_tree(&database).unwrap();
        let writes = database.physical_writes();
        assert_eq!(index.write_tree(&database).unwrap(), tree);
        assert_eq!(database.physical_writes(), writes);

        let mut reloaded = Index::in_memory(HashAlgorithm::Sha1);
        reloaded.read_tree(&database, &tree).unwrap();
        assert_eq!(paths(&reloaded), vec!["a.txt", "lib/b.rs", "lib/sub/c.rs"]);
    }

    #[rstest]
    #[case(HashAlgorithm::Sha1)]
    #[case(HashAlgorithm::Sha256)]
    fn persists_entries_and_stages(#[case] algorithm: HashAlgorithm) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index");
        let oid = algorithm.digest(b"content");
        let conflict = DatabaseEntry::new(oid.clone(), EntryMode::EXECUTABLE);

        let mut index = Index::new(&path, algorithm);
        index
            .add_entry(IndexEntry::new(
                "some/longer/path/name.txt".to_string(),
                oid.clone(),
                EntryMetadata::with_mode(EntryMode::REGULAR),
            ))
            .unwrap();
        index.add_conflict("c", Some(conflict.clone()), None, Some(conflict)).unwrap();
        index.write().unwrap();

        let reloaded = Index::load(&path, algorithm).unwrap();

        assert_eq!(
            reloaded.entries().cloned().collect::<Vec<_>>(),
            index.entries().cloned().collect::<Vec<_>>()
        );
        assert!(reloaded.entry("c", Stage::Theirs).is_some());
        assert!(!reloaded.is_changed());
    }

    #[rstest]
    fn missing_file_is_an_empty_index() {
        let dir = TempDir::new().unwrap();

        let index = Index::load(dir.path().join("index"), HashAlgorithm::Sha1).unwrap();

        assert!(index.is_empty());
    }

    #[rstest]
    fn tampered_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index");
        let mut index = Index::new(&path, HashAlgorithm::Sha1);
        index.add_entry(entry("file", b"x")).unwrap();
        index.write().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 70] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            Index::load(&path, HashAlgorithm::Sha1),
            Err(Error::Corrupt { .. })
        ));
    }
}
