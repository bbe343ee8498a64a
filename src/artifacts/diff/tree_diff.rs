//! Path-level comparison of two flattened trees

use crate::artifacts::database::database_entry::DatabaseEntry;
use bitflags::bitflags;
use std::collections::BTreeMap;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct DiffFilter: u32 {
        const ADDED = 0b0001;
        const DELETED = 0b0010;
        const MODIFIED = 0b0100;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    pub fn matches_filter(&self, filter: DiffFilter) -> bool {
        match self {
            TreeChangeType::Added(_) => filter.contains(DiffFilter::ADDED),
            TreeChangeType::Deleted(_) => filter.contains(DiffFilter::DELETED),
            TreeChangeType::Modified { .. } => filter.contains(DiffFilter::MODIFIED),
        }
    }

    pub fn old_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Deleted(entry) => Some(entry),
            TreeChangeType::Modified { old, .. } => Some(old),
            TreeChangeType::Added(_) => None,
        }
    }

    pub fn new_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Added(entry) => Some(entry),
            TreeChangeType::Modified { new, .. } => Some(new),
            TreeChangeType::Deleted(_) => None,
        }
    }
}

pub type TreeEntryMap = BTreeMap<String, DatabaseEntry>;
pub type ChangeSet = BTreeMap<String, TreeChangeType>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    change_set: ChangeSet,
}

impl TreeDiff {
    /// Changes turning `old` into `new`
    pub fn between(old: &TreeEntryMap, new: &TreeEntryMap) -> Self {
        let mut change_set = ChangeSet::new();

        for (path, old_entry) in old {
            if let Some(change) =
                TreeChangeType::from_entries(Some(old_entry.clone()), new.get(path).cloned())
            {
                change_set.insert(path.clone(), change);
            }
        }
        for (path, new_entry) in new {
            if !old.contains_key(path) {
                change_set.insert(path.clone(), TreeChangeType::Added(new_entry.clone()));
            }
        }

        TreeDiff { change_set }
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn change(&self, path: &str) -> Option<&TreeChangeType> {
        self.change_set.get(path)
    }

    pub fn filtered(&self, filter: DiffFilter) -> impl Iterator<Item = (&String, &TreeChangeType)> {
        self.change_set
            .iter()
            .filter(move |(_, change)| change.matches_filter(filter))
    }

    pub fn is_empty(&self) -> bool {
        self.change_set.is_empty()
    }
}
