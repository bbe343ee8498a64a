//! Patience diff
//!
//! Lines occurring exactly once on both sides act as anchors. The longest run of
//! anchors appearing in the same order on both sides splits the problem; each
//! gap is diffed recursively, and gaps without anchors fall back to Myers.

use crate::artifacts::diff::myers::MyersDiff;
use crate::artifacts::diff::{DiffAlgorithm, Edit};
use derive_new::new;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct PatienceDiff<'d, T> {
    a: &'d [T],
    b: &'d [T],
}

impl<T: Eq + Hash> PatienceDiff<'_, T> {
    fn diff_range(&self, mut a: Range<usize>, mut b: Range<usize>, edits: &mut Vec<Edit>) {
        // common prefix
        while !a.is_empty() && !b.is_empty() && self.a[a.start] == self.b[b.start] {
            edits.push(Edit::Equal {
                a: a.start,
                b: b.start,
            });
            a.start += 1;
            b.start += 1;
        }

        // common suffix, emitted after the middle
        let mut suffix = Vec::new();
        while !a.is_empty() && !b.is_empty() && self.a[a.end - 1] == self.b[b.end - 1] {
            a.end -= 1;
            b.end -= 1;
            suffix.push(Edit::Equal { a: a.end, b: b.end });
        }

        let anchors = self.unique_common_anchors(a.clone(), b.clone());
        if anchors.is_empty() {
            let (a_offset, b_offset) = (a.start, b.start);
            let sub_edits = MyersDiff::new(&self.a[a], &self.b[b]).diff();

            edits.extend(sub_edits.into_iter().map(|edit| match edit {
                Edit::Delete { a } => Edit::Delete { a: a + a_offset },
                Edit::Insert { b } => Edit::Insert { b: b + b_offset },
                Edit::Equal { a, b } => Edit::Equal {
                    a: a + a_offset,
                    b: b + b_offset,
                },
            }));
        } else {
            let (mut a_pos, mut b_pos) = (a.start, b.start);
            for (a_anchor, b_anchor) in anchors {
                self.diff_range(a_pos..a_anchor, b_pos..b_anchor, edits);
                edits.push(Edit::Equal {
                    a: a_anchor,
                    b: b_anchor,
                });
                (a_pos, b_pos) = (a_anchor + 1, b_anchor + 1);
            }
            self.diff_range(a_pos..a.end, b_pos..b.end, edits);
        }

        edits.extend(suffix.into_iter().rev());
    }

    /// Longest increasing run of lines unique to both ranges
    fn unique_common_anchors(&self, a: Range<usize>, b: Range<usize>) -> Vec<(usize, usize)> {
        // line -> (count in a, position in a, count in b, position in b)
        let mut occurrences: HashMap<&T, (usize, usize, usize, usize)> = HashMap::new();
        for i in a {
            let slot = occurrences.entry(&self.a[i]).or_default();
            slot.0 += 1;
            slot.1 = i;
        }
        for j in b {
            let slot = occurrences.entry(&self.b[j]).or_default();
            slot.2 += 1;
            slot.3 = j;
        }

        let mut pairs = occurrences
            .into_values()
            .filter(|(a_count, _, b_count, _)| *a_count == 1 && *b_count == 1)
            .map(|(_, i, _, j)| (i, j))
            .collect::<Vec<_>>();
        pairs.sort_unstable();

        longest_increasing_by_b(&pairs)
    }
}

/// Patience sorting over pairs already ordered by their `a` position
fn longest_increasing_by_b(pairs: &[(usize, usize)]) -> Vec<(usize, usize)> {
    // tails[len] = index into `pairs` ending the best run of length len + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessors: Vec<Option<usize>> = vec![None; pairs.len()];

    for (index, (_, b)) in pairs.iter().enumerate() {
        let position = tails.partition_point(|tail| pairs[*tail].1 < *b);
        if position > 0 {
            predecessors[index] = Some(tails[position - 1]);
        }
        if position == tails.len() {
            tails.push(index);
        } else {
            tails[position] = index;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(index) = cursor {
        run.push(pairs[index]);
        cursor = predecessors[index];
    }
    run.reverse();

    run
}

impl<T: Eq + Hash> DiffAlgorithm for PatienceDiff<'_, T> {
    fn diff(&self) -> Vec<Edit> {
        let mut edits = Vec::new();
        self.diff_range(0..self.a.len(), 0..self.b.len(), &mut edits);
        edits
    }
}
