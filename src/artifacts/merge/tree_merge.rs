//! Three-way merge of whole trees
//!
//! Works path by path over the flattened trees. A path changed on one side
//! only takes that side, deletions included. A path changed on both sides has
//! its mode and content merged; what cannot be merged becomes a conflict that
//! records every side plus the content to leave in the working tree.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeEntryMap;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::merge::merge_file::{MergeFileOptions, merge_file};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConflict {
    pub ancestor: Option<DatabaseEntry>,
    pub ours: Option<DatabaseEntry>,
    pub theirs: Option<DatabaseEntry>,
    /// What the working tree should hold, `None` to leave no file
    pub worktree: Option<(Bytes, EntryMode)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeMergeResult {
    /// Resolved paths
    pub entries: TreeEntryMap,
    pub conflicts: BTreeMap<String, TreeConflict>,
}

impl TreeMergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn conflicted_paths(&self) -> Vec<String> {
        self.conflicts.keys().cloned().collect()
    }
}

/// Merge `ours` and `theirs` against `ancestor`; absent trees count as empty
pub fn merge_trees(
    database: &Database,
    ancestor: Option<&ObjectId>,
    ours: Option<&ObjectId>,
    theirs: Option<&ObjectId>,
    options: &MergeFileOptions,
) -> Result<TreeMergeResult> {
    let flatten = |oid: Option<&ObjectId>| -> Result<TreeEntryMap> {
        match oid {
            Some(oid) => database.flatten_tree(&database.peel_to_tree(oid)?),
            None => Ok(TreeEntryMap::new()),
        }
    };
    let (base, ours, theirs) = (flatten(ancestor)?, flatten(ours)?, flatten(theirs)?);

    let paths = base
        .keys()
        .chain(ours.keys())
        .chain(theirs.keys())
        .collect::<BTreeSet<_>>();

    let mut result = TreeMergeResult::default();
    for path in paths {
        let sides = Sides {
            ancestor: base.get(path),
            ours: ours.get(path),
            theirs: theirs.get(path),
        };

        match sides.resolve(database, options)? {
            Resolution::Take(Some(entry)) => {
                result.entries.insert(path.clone(), entry);
            }
            Resolution::Take(None) => {}
            Resolution::Conflict(worktree) => {
                warn!(path = %path, "conflict");
                result.conflicts.insert(
                    path.clone(),
                    TreeConflict {
                        ancestor: sides.ancestor.cloned(),
                        ours: sides.ours.cloned(),
                        theirs: sides.theirs.cloned(),
                        worktree,
                    },
                );
            }
        }
    }

    debug!(
        entries = result.entries.len(),
        conflicts = result.conflicts.len(),
        "merged trees"
    );
    Ok(result)
}

enum Resolution {
    Take(Option<DatabaseEntry>),
    Conflict(Option<(Bytes, EntryMode)>),
}

#[derive(Debug, Clone, Copy)]
struct Sides<'e> {
    ancestor: Option<&'e DatabaseEntry>,
    ours: Option<&'e DatabaseEntry>,
    theirs: Option<&'e DatabaseEntry>,
}

impl Sides<'_> {
    fn resolve(&self, database: &Database, options: &MergeFileOptions) -> Result<Resolution> {
        if self.ours == self.theirs {
            return Ok(Resolution::Take(self.ours.cloned()));
        }
        if self.ancestor == self.ours {
            return Ok(Resolution::Take(self.theirs.cloned()));
        }
        if self.ancestor == self.theirs {
            return Ok(Resolution::Take(self.ours.cloned()));
        }

        let (ours, theirs) = match (self.ours, self.theirs) {
            (Some(ours), Some(theirs)) => (ours, theirs),
            // modified on one side, deleted on the other: keep what is left
            (Some(remaining), None) | (None, Some(remaining)) => {
                return Ok(Resolution::Conflict(Self::worktree_of(database, remaining)?));
            }
            (None, None) => return Ok(Resolution::Take(None)),
        };

        let mode = self.merge_mode(ours.mode, theirs.mode);
        let content_mergeable =
            matches!(ours.mode, EntryMode::File(_)) && matches!(theirs.mode, EntryMode::File(_));
        if !content_mergeable {
            trace!(ours = %ours.mode, theirs = %theirs.mode, "cannot merge content");
            return Ok(Resolution::Conflict(Self::worktree_of(database, ours)?));
        }

        let ancestor_oid = self.ancestor.map(|entry| &entry.oid);
        let oid = if ours.oid == theirs.oid || ancestor_oid == Some(&theirs.oid) {
            ours.oid.clone()
        } else if ancestor_oid == Some(&ours.oid) {
            theirs.oid.clone()
        } else {
            let ancestor_content = match self.ancestor.filter(|entry| entry.is_blob()) {
                Some(entry) => database.load_blob(&entry.oid)?.into_content(),
                None => Bytes::new(),
            };
            let our_content = database.load_blob(&ours.oid)?.into_content();
            let their_content = database.load_blob(&theirs.oid)?.into_content();

            match merge_file(&ancestor_content, &our_content, &their_content, options) {
                Ok(merged) if merged.automergeable => database.put(ObjectType::Blob, &merged.content)?,
                Ok(merged) => {
                    let mode = mode.unwrap_or(ours.mode);
                    return Ok(Resolution::Conflict(Some((merged.content, mode))));
                }
                Err(Error::BinaryConflict) => {
                    return Ok(Resolution::Conflict(Some((our_content, ours.mode))));
                }
                Err(err) => return Err(err),
            }
        };

        match mode {
            Some(mode) => Ok(Resolution::Take(Some(DatabaseEntry::new(oid, mode)))),
            None => {
                let content = database.load_blob(&oid)?.into_content();
                Ok(Resolution::Conflict(Some((content, ours.mode))))
            }
        }
    }

    /// Mode after merging, `None` when both sides changed it differently
    fn merge_mode(&self, ours: EntryMode, theirs: EntryMode) -> Option<EntryMode> {
        let ancestor = self.ancestor.map(|entry| entry.mode);

        if ours == theirs || ancestor == Some(theirs) {
            Some(ours)
        } else if ancestor == Some(ours) {
            Some(theirs)
        } else {
            None
        }
    }

    fn worktree_of(database: &Database, entry: &DatabaseEntry) -> Result<Option<(Bytes, EntryMode)>> {
        if !entry.is_blob() {
            return Ok(None);
        }

        Ok(Some((database.load_blob(&entry.oid)?.into_content(), entry.mode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::hash::HashAlgorithm;
    use crate::artifacts::objects::tree_builder::TreeBuilder;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> Database {
        Database::in_memory(HashAlgorithm::Sha1)
    }

    fn tree(database: &Database, files: &[(&str, &str, EntryMode)]) -> ObjectId {
        let mut builder = TreeBuilder::new(database, None).unwrap();
        for (path, content, mode) in files {
            let oid = database.put(ObjectType::Blob, content.as_bytes()).unwrap();
            builder.insert(path, oid, *mode).unwrap();
        }
        builder.write().unwrap()
    }

    fn content(database: &Database, result: &TreeMergeResult, path: &str) -> String {
        let oid = &result.entries[path].oid;
        String::from_utf8(database.load_blob(oid).unwrap().into_content().to_vec()).unwrap()
    }

    const REG: EntryMode = EntryMode::REGULAR;

    #[rstest]
    fn one_sided_changes_and_deletions_apply(database: Database) {
        let base = tree(&database, &[("keep", "k\n", REG), ("gone", "g\n", REG), ("edit", "e\n", REG)]);
        let ours = tree(&database, &[("keep", "k\n", REG), ("edit", "e\n", REG), ("new", "n\n", REG)]);
        let theirs = tree(&database, &[("keep", "k\n", REG), ("gone", "g\n", REG), ("edit", "E\n", REG)]);

        let result = merge_trees(
            &database,
            Some(&base),
            Some(&ours),
            Some(&theirs),
            &MergeFileOptions::default(),
        )
        .unwrap();

        assert!(result.is_clean());
        assert_eq!(
            result.entries.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["edit", "keep", "new"]
        );
        assert_eq!(content(&database, &result, "edit"), "E\n");
    }

    #[rstest]
    fn both_sides_editing_different_lines_merge(database: Database) {
        let base = tree(&database, &[("f", "1\n2\n3\n4\n5\n", REG)]);
        let ours = tree(&database, &[("f", "one\n2\n3\n4\n5\n", EntryMode::EXECUTABLE)]);
        let theirs = tree(&database, &[("f", "1\n2\n3\n4\nfive\n", REG)]);

        let result = merge_trees(
            &database,
            Some(&base),
            Some(&ours),
            Some(&theirs),
            &MergeFileOptions::default(),
        )
        .unwrap();

        assert!(result.is_clean());
        assert_eq!(content(&database, &result, "f"), "one\n2\n3\n4\nfive\n");
        assert_eq!(result.entries["f"].mode, EntryMode::EXECUTABLE);
    }

    #[rstest]
    fn conflicting_edits_record_all_sides(database: Database) {
        let base = tree(&database, &[("f", "base\n", REG)]);
        let ours = tree(&database, &[("f", "ours\n", REG)]);
        let theirs = tree(&database, &[("f", "theirs\n", REG)]);

        let result = merge_trees(
            &database,
            Some(&base),
            Some(&ours),
            Some(&theirs),
            &MergeFileOptions::default(),
        )
        .unwrap();

        let conflict = &result.conflicts["f"];
        assert!(conflict.ancestor.is_some() && conflict.ours.is_some() && conflict.theirs.is_some());
        let (worktree, mode) = conflict.worktree.clone().unwrap();
        assert_eq!(mode, REG);
        assert_eq!(
            worktree.as_ref(),
            b"<<<<<<< ours\nours\n=======\ntheirs\n>>>>>>> theirs\n"
        );
    }

    #[rstest]
    fn modify_delete_keeps_the_modified_side(database: Database) {
        let base = tree(&database, &[("f", "base\n", REG), ("other", "o\n", REG)]);
        let ours = tree(&database, &[("other", "o\n", REG)]);
        let theirs = tree(&database, &[("f", "changed\n", REG), ("other", "o\n", REG)]);

        let result =
            merge_trees(&database, Some(&base), Some(&ours), Some(&theirs), &MergeFileOptions::default())
                .unwrap();

        let conflict = &result.conflicts["f"];
        assert!(conflict.ours.is_none());
        assert_eq!(conflict.worktree.as_ref().unwrap().0.as_ref(), b"changed\n");
    }

    #[rstest]
    fn binary_conflicts_keep_ours(database: Database) {
        let base = tree(&database, &[("bin", "a\0", REG)]);
        let ours = tree(&database, &[("bin", "b\0", REG)]);
        let theirs = tree(&database, &[("bin", "c\0", REG)]);

        let result =
            merge_trees(&database, Some(&base), Some(&ours), Some(&theirs), &MergeFileOptions::default())
                .unwrap();

        assert_eq!(result.conflicts["bin"].worktree.as_ref().unwrap().0.as_ref(), b"b\0");
    }
}
