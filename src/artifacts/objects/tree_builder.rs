//! Incremental construction of nested trees
//!
//! A builder starts from an optional base tree and applies path-level inserts and
//! removals. Subtrees of the base are only read when a path below them is touched,
//! and `write` stores only the levels that changed.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeEntry, validate_entry_name};
use crate::errors::{Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug)]
enum Node {
    Leaf(DatabaseEntry),
    Tree(Level),
}

/// One directory level
///
/// `entries` stays `None` until the stored tree is needed.
#[derive(Debug, Default)]
struct Level {
    oid: Option<ObjectId>,
    entries: Option<BTreeMap<String, Node>>,
    modified: bool,
}

impl Level {
    fn stored(oid: ObjectId) -> Self {
        Level {
            oid: Some(oid),
            entries: None,
            modified: false,
        }
    }

    fn fresh() -> Self {
        Level {
            oid: None,
            entries: Some(BTreeMap::new()),
            modified: true,
        }
    }

    fn entries_mut(&mut self, database: &Database) -> Result<&mut BTreeMap<String, Node>> {
        if self.entries.is_none() {
            let mut entries = BTreeMap::new();

            if let Some(oid) = &self.oid {
                for entry in database.load_tree(oid)?.into_entries() {
                    let node = if entry.is_tree() {
                        Node::Tree(Level::stored(entry.oid))
                    } else {
                        Node::Leaf(entry.to_database_entry())
                    };
                    entries.insert(entry.name, node);
                }
            }

            self.entries = Some(entries);
        }

        Ok(self.entries.get_or_insert_with(BTreeMap::new))
    }

    /// Id of the level after writing, `None` when it holds nothing
    fn write(&mut self, database: &Database) -> Result<Option<ObjectId>> {
        if !self.modified
            && let Some(oid) = &self.oid
        {
            return Ok(Some(oid.clone()));
        }

        let mut tree_entries = Vec::new();
        for (name, node) in self.entries_mut(database)?.iter_mut() {
            match node {
                Node::Leaf(entry) => {
                    tree_entries.push(TreeEntry::new(name.clone(), entry.mode, entry.oid.clone()))
                }
                Node::Tree(level) => {
                    if let Some(oid) = level.write(database)? {
                        tree_entries.push(TreeEntry::new(name.clone(), EntryMode::Directory, oid));
                    }
                }
            }
        }

        if tree_entries.is_empty() {
            return Ok(None);
        }

        let oid = database.store(&Tree::from_entries(tree_entries)?)?;
        self.oid = Some(oid.clone());
        self.modified = false;

        Ok(Some(oid))
    }
}

pub(crate) fn split_path(path: &str) -> Result<Vec<&str>> {
    let names = path.split('/').collect::<Vec<_>>();
    for name in &names {
        validate_entry_name(name)
            .map_err(|reason| Error::InvalidArgument(format!("invalid path '{path}': {reason}")))?;
    }

    Ok(names)
}

#[derive(Debug)]
pub struct TreeBuilder<'d> {
    database: &'d Database,
    root: Level,
}

impl<'d> TreeBuilder<'d> {
    /// Start from `base`, or from an empty tree
    pub fn new(database: &'d Database, base: Option<&ObjectId>) -> Result<Self> {
        let mut root = match base {
            Some(oid) => Level::stored(oid.clone()),
            None => Level::fresh(),
        };
        root.entries_mut(database)?;

        Ok(TreeBuilder { database, root })
    }

    /// Upsert the entry at `path`, creating intermediate directories
    ///
    /// A file in the way of a directory is replaced. Inserting with
    /// `EntryMode::Directory` places the whole subtree `oid`.
    pub fn insert(&mut self, path: &str, oid: ObjectId, mode: EntryMode) -> Result<()> {
        let names = split_path(path)?;
        Self::insert_into(&mut self.root, self.database, &names, oid, mode)
    }

    fn insert_into(
        level: &mut Level,
        database: &Database,
        names: &[&str],
        oid: ObjectId,
        mode: EntryMode,
    ) -> Result<()> {
        level.modified = true;
        let entries = level.entries_mut(database)?;

        match names {
            [] => Err(Error::InvalidArgument("empty path".to_string())),
            [name] => {
                let node = if mode.is_tree() {
                    Node::Tree(Level::stored(oid))
                } else {
                    Node::Leaf(DatabaseEntry::new(oid, mode))
                };
                entries.insert(name.to_string(), node);

                Ok(())
            }
            [name, rest @ ..] => {
                let node = entries
                    .entry(name.to_string())
                    .or_insert_with(|| Node::Tree(Level::fresh()));
                if let Node::Leaf(_) = node {
                    *node = Node::Tree(Level::fresh());
                }

                match node {
                    Node::Tree(sub) => Self::insert_into(sub, database, rest, oid, mode),
                    Node::Leaf(_) => Err(Error::InvalidArgument(format!(
                        "cannot descend into '{name}'"
                    ))),
                }
            }
        }
    }

    /// Delete the entry at `path`, pruning directories left empty
    ///
    /// Fails with `NotFound` when nothing exists at `path`.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let names = split_path(path)?;
        Self::remove_from(&mut self.root, self.database, &names, path)
    }

    fn remove_from(level: &mut Level, database: &Database, names: &[&str], path: &str) -> Result<()> {
        let not_found = || Error::NotFound(format!("tree entry '{path}'"));
        let entries = level.entries_mut(database)?;

        match names {
            [] => return Err(not_found()),
            [name] => {
                entries.remove(*name).ok_or_else(not_found)?;
            }
            [name, rest @ ..] => {
                let Some(Node::Tree(sub)) = entries.get_mut(*name) else {
                    return Err(not_found());
                };
                Self::remove_from(sub, database, rest, path)?;

                if sub.entries.as_ref().is_some_and(BTreeMap::is_empty) {
                    entries.remove(*name);
                }
            }
        }

        level.modified = true;
        Ok(())
    }

    /// The file entry at `path`; directories and missing paths give `None`
    pub fn get(&mut self, path: &str) -> Result<Option<DatabaseEntry>> {
        let names = split_path(path)?;
        let mut level = &mut self.root;

        for (position, name) in names.iter().enumerate() {
            let is_last = position + 1 == names.len();

            match level.entries_mut(self.database)?.get_mut(*name) {
                Some(Node::Leaf(entry)) if is_last => return Ok(Some(entry.clone())),
                Some(Node::Tree(sub)) if !is_last => level = sub,
                _ => return Ok(None),
            }
        }

        Ok(None)
    }

    pub fn is_empty(&self) -> bool {
        self.root.entries.as_ref().is_none_or(BTreeMap::is_empty)
    }

    /// Store every modified level bottom-up and return the root tree id
    pub fn write(&mut self) -> Result<ObjectId> {
        let oid = match self.root.write(self.database)? {
            Some(oid) => oid,
            None => self.database.store(&Tree::default())?,
        };

        debug!(%oid, "wrote tree");
        Ok(oid)
    }
}
