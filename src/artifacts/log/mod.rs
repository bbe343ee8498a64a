//! Commit history traversal
//!
//! - `rev_list`: commits reachable from one revision but not from another

pub mod rev_list;
