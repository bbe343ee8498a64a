//! Core repository components
//!
//! - `backend`: Storage backends for raw objects (loose files, memory)
//! - `config`: Repository options and the `.git/config` file
//! - `database`: Object database for storing blobs, trees, commits and tags
//! - `index`: Staging area, including conflict stages
//! - `refs`: Reference management (branches, HEAD)
//! - `repository`: High-level repository operations and coordination
//! - `workspace`: Working tree access, on disk or in memory

pub mod backend;
pub mod config;
pub mod database;
pub mod index;
pub mod refs;
pub mod repository;
pub mod workspace;
