//! Git data structures and algorithms
//!
//! - `branch`: Branch and reference names
//! - `database`: Database entry types
//! - `diff`: Line diffs (Myers, patience) and tree diffs
//! - `index`: Index entry, header and checksum formats
//! - `log`: Commit history traversal
//! - `merge`: Three-way file and tree merges
//! - `objects`: Git object types (blob, tree, commit, tag) and the tree builder
//! - `rebase`: Rebase plans and the engine replaying them

pub mod branch;
pub mod database;
pub mod diff;
pub mod index;
pub mod log;
pub mod merge;
pub mod objects;
pub mod rebase;
