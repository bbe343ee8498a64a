//! Three-way merging of file contents and of trees

pub mod diff3;
pub mod merge_file;
pub mod tree_merge;
