//! Replaying commits onto a new base
//!
//! - `operation`: plan steps (pick, reword, edit, squash, fixup, exec)
//! - `plan`: the ordered steps and the cursor over them
//! - `state_dir`: persistence under `.git/rebase-merge`
//! - `engine`: the state machine driving a rebase

pub mod engine;
pub mod operation;
pub mod plan;
pub mod state_dir;
