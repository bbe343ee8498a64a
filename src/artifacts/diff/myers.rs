//! Myers' O(ND) shortest edit script
//!
//! Walks the edit graph one diagonal band `d` at a time, keeping the furthest
//! reaching `x` for every diagonal `k`; the trace of those vectors is replayed
//! backwards to recover the path.

use crate::artifacts::diff::{DiffAlgorithm, Edit};
use derive_new::new;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct MyersDiff<'d, T> {
    a: &'d [T],
    b: &'d [T],
}

impl<T: Eq> MyersDiff<'_, T> {
    fn compute_shortest_edit(&self) -> Vec<Vec<isize>> {
        let (n, m) = (self.a.len() as isize, self.b.len() as isize);
        let offset = (n + m) as usize;

        // one spare slot so `k == -d` can always look at `k + 1`
        let mut v = vec![0; 2 * offset + 2];
        let mut trace = Vec::new();

        for d in 0..=(n + m) {
            trace.push(v.clone());

            for k in (-d..=d).step_by(2) {
                let idx = (offset as isize + k) as usize;

                let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                    // came down from k+1, an insertion
                    v[idx + 1]
                } else {
                    // came right from k-1, a deletion
                    v[idx - 1] + 1
                };

                let mut y = x - k;
                while x < n && y < m && self.a[x as usize] == self.b[y as usize] {
                    x += 1;
                    y += 1;
                }

                v[idx] = x;

                if x >= n && y >= m {
                    return trace;
                }
            }
        }

        trace
    }

    /// Moves `(prev_x, prev_y, x, y)` from the end of both sequences back to the origin
    fn backtrack(&self) -> Vec<(isize, isize, isize, isize)> {
        let (mut x, mut y) = (self.a.len() as isize, self.b.len() as isize);
        let offset = x + y;
        let mut edit_path = Vec::new();

        for (d, v) in self.compute_shortest_edit().iter().enumerate().rev() {
            let d = d as isize;
            let k = x - y;

            let prev_k = if k == -d
                || (k != d && v[(offset + k - 1) as usize] < v[(offset + k + 1) as usize])
            {
                k + 1
            } else {
                k - 1
            };

            let prev_x = v[(offset + prev_k) as usize];
            let prev_y = prev_x - prev_k;

            while x > prev_x && y > prev_y {
                edit_path.push((x - 1, y - 1, x, y));
                x -= 1;
                y -= 1;
            }

            if d > 0 {
                edit_path.push((prev_x, prev_y, x, y));
            }

            (x, y) = (prev_x, prev_y);
        }

        edit_path
    }
}

impl<T: Eq> DiffAlgorithm for MyersDiff<'_, T> {
    fn diff(&self) -> Vec<Edit> {
        if self.a.is_empty() && self.b.is_empty() {
            return Vec::new();
        }

        let mut edits = self
            .backtrack()
            .into_iter()
            .map(|(prev_x, prev_y, x, y)| {
                if x == prev_x {
                    Edit::Insert {
                        b: prev_y as usize,
                    }
                } else if y == prev_y {
                    Edit::Delete {
                        a: prev_x as usize,
                    }
                } else {
                    Edit::Equal {
                        a: prev_x as usize,
                        b: prev_y as usize,
                    }
                }
            })
            .collect::<Vec<_>>();

        edits.reverse();
        edits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn string_inputs() -> (Vec<char>, Vec<char>) {
        ("abcabba".chars().collect(), "cbabac".chars().collect())
    }

    #[rstest]
    fn finds_a_shortest_script(string_inputs: (Vec<char>, Vec<char>)) {
        let (a, b) = string_inputs;
        let edits = MyersDiff::new(&a, &b).diff();

        let changes = edits
            .iter()
            .filter(|edit| !matches!(edit, Edit::Equal { .. }))
            .count();
        assert_eq!(changes, 5);
        assert_eq!(
            edits,
            vec![
                Edit::Delete { a: 0 },
                Edit::Delete { a: 1 },
                Edit::Equal { a: 2, b: 0 },
                Edit::Insert { b: 1 },
                Edit::Equal { a: 3, b: 2 },
                Edit::Equal { a: 4, b: 3 },
                Edit::Delete { a: 5 },
                Edit::Equal { a: 6, b: 4 },
                Edit::Insert { b: 5 },
            ]
        );
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec!["x"], vec![])]
    #[case(vec![], vec!["y"])]
    fn handles_empty_sides(#[case] a: Vec<&str>, #[case] b: Vec<&str>) {
        let edits = MyersDiff::new(&a, &b).diff();

        assert_eq!(edits.len(), a.len() + b.len());
    }

    proptest! {
        #[test]
        fn script_replays_into_the_target(
            a in proptest::collection::vec(0u8..4, 0..24),
            b in proptest::collection::vec(0u8..4, 0..24),
        ) {
            let edits = MyersDiff::new(&a, &b).diff();

            let rebuilt = edits
                .iter()
                .filter_map(|edit| match edit {
                    Edit::Insert { b: j } | Edit::Equal { b: j, .. } => Some(b[*j]),
                    Edit::Delete { .. } => None,
                })
                .collect::<Vec<_>>();
            prop_assert_eq!(rebuilt, b.clone());

            for edit in &edits {
                if let Edit::Equal { a: i, b: j } = edit {
                    prop_assert_eq!(a[*i], b[*j]);
                }
            }
        }
    }
}
