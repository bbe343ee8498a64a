use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object_id::ObjectId;
use derive_new::new;
use std::fmt;

/// An `(id, mode)` pair as referenced from a tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, new)]
pub struct DatabaseEntry {
    pub oid: ObjectId,
    pub mode: EntryMode,
}

impl DatabaseEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// Regular or executable file content
    pub fn is_blob(&self) -> bool {
        self.mode.is_blob()
    }
}

impl From<&IndexEntry> for DatabaseEntry {
    fn from(entry: &IndexEntry) -> Self {
        DatabaseEntry::new(entry.oid.clone(), entry.mode())
    }
}

impl fmt::Display for DatabaseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.oid)
    }
}
