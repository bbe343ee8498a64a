//! Content-addressable repository engine
//!
//! Stores blobs, trees, commits and tags by digest (SHA-1 or SHA-256), stages
//! files in an index that can hold merge conflicts, merges files and trees
//! three ways, and replays commits onto a new base with an interactive rebase.
//!
//! - [`areas`]: the stateful parts of a repository (database, index, refs,
//!   working tree, configuration) and the [`Repository`] tying them together
//! - [`artifacts`]: the data types and algorithms they work with
//! - [`errors`]: the shared [`Error`] type

pub mod areas;
pub mod artifacts;
pub mod errors;

pub use areas::config::RepositoryOptions;
pub use areas::repository::Repository;
pub use artifacts::merge::merge_file::{MergeFileOptions, MergeFileResult, merge_file};
pub use artifacts::objects::hash::HashAlgorithm;
pub use artifacts::objects::object_id::ObjectId;
pub use artifacts::rebase::engine::{NextOutcome, Rebase, RebaseOptions, RebaseState};
pub use errors::{Error, Result};
