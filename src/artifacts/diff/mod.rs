//! Diff algorithms and tree comparison
//!
//! - `myers`: Myers' shortest edit script
//! - `patience`: unique-line anchored diff, falling back to Myers between anchors
//! - `tree_diff`: path-level comparison of flattened trees
//!
//! Line diffs produce an index-based edit script so callers can map every
//! line back to its position in either input.

pub mod myers;
pub mod patience;
pub mod tree_diff;

use crate::artifacts::diff::myers::MyersDiff;
use crate::artifacts::diff::patience::PatienceDiff;
use crate::errors::{Error, Result};
use std::hash::Hash;

/// One step of an edit script turning `a` into `b`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Delete { a: usize },
    Insert { b: usize },
    Equal { a: usize, b: usize },
}

pub trait DiffAlgorithm {
    /// Edit script in sequence order
    fn diff(&self) -> Vec<Edit>;

    /// Pairs of matching positions `(a, b)`, both strictly increasing
    fn matches(&self) -> Vec<(usize, usize)> {
        self.diff()
            .into_iter()
            .filter_map(|edit| match edit {
                Edit::Equal { a, b } => Some((a, b)),
                _ => None,
            })
            .collect()
    }
}

/// Line matching strategy used by content merges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffStrategy {
    /// Myers' minimal edit script
    #[default]
    Minimal,
    Patience,
}

impl DiffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStrategy::Minimal => "minimal",
            DiffStrategy::Patience => "patience",
        }
    }

    pub fn diff<T: Eq + Hash>(&self, a: &[T], b: &[T]) -> Vec<Edit> {
        match self {
            DiffStrategy::Minimal => MyersDiff::new(a, b).diff(),
            DiffStrategy::Patience => PatienceDiff::new(a, b).diff(),
        }
    }

    pub fn matches<T: Eq + Hash>(&self, a: &[T], b: &[T]) -> Vec<(usize, usize)> {
        match self {
            DiffStrategy::Minimal => MyersDiff::new(a, b).matches(),
            DiffStrategy::Patience => PatienceDiff::new(a, b).matches(),
        }
    }
}

impl TryFrom<&str> for DiffStrategy {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "minimal" | "myers" => Ok(DiffStrategy::Minimal),
            "patience" => Ok(DiffStrategy::Patience),
            _ => Err(Error::InvalidArgument(format!("unknown diff strategy '{value}'"))),
        }
    }
}
