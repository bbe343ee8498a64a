//! Object types and operations
//!
//! All content is stored as objects identified by the digest of their encoding.
//! There are four types:
//!
//! - **Blob**: File content (raw bytes)
//! - **Tree**: Directory listing (names, modes, and object IDs)
//! - **Commit**: Snapshot with metadata (signatures, message, parent commits, tree)
//! - **Tag**: Annotated reference to another object
//!
//! Every object is hashed and stored as `<type> <size>\0<payload>`.
//! The `tree_builder` assembles nested trees from flat path updates.

pub mod blob;
pub mod commit;
pub mod hash;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod tree_builder;
