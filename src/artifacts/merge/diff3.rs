//! Three-way chunking
//!
//! The ancestor is diffed against both sides. Runs of ancestor lines matched
//! at the same relative position on both sides are stable; everything between
//! two stable runs forms one unstable chunk, to be resolved by the caller.

use crate::artifacts::diff::DiffStrategy;
use std::ops::Range;

/// Split content into lines, each keeping its `\n` terminator
///
/// A last line without a terminator is kept as is.
pub fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    content.split_inclusive(|byte| *byte == b'\n').collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// All three agree
    Stable,
    /// At least one side differs from the ancestor
    Unstable,
}

/// Line ranges of one chunk on every input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub base: Range<usize>,
    pub ours: Range<usize>,
    pub theirs: Range<usize>,
}

impl Chunk {
    fn stable(o: usize, a: usize, b: usize, len: usize) -> Self {
        Chunk {
            kind: ChunkKind::Stable,
            base: o..o + len,
            ours: a..a + len,
            theirs: b..b + len,
        }
    }

    fn unstable(base: Range<usize>, ours: Range<usize>, theirs: Range<usize>) -> Self {
        Chunk {
            kind: ChunkKind::Unstable,
            base,
            ours,
            theirs,
        }
    }
}

/// Position of each ancestor line on the other side, if matched
fn match_table(base_len: usize, matches: Vec<(usize, usize)>) -> Vec<Option<usize>> {
    let mut table = vec![None; base_len];
    for (o, other) in matches {
        table[o] = Some(other);
    }
    table
}

pub fn chunks(
    base: &[&[u8]],
    ours: &[&[u8]],
    theirs: &[&[u8]],
    strategy: DiffStrategy,
) -> Vec<Chunk> {
    let in_ours = match_table(base.len(), strategy.matches(base, ours));
    let in_theirs = match_table(base.len(), strategy.matches(base, theirs));

    let mut result = Vec::new();
    let (mut o, mut a, mut b) = (0, 0, 0);

    loop {
        let mut stable_len = 0;
        while o + stable_len < base.len()
            && in_ours[o + stable_len] == Some(a + stable_len)
            && in_theirs[o + stable_len] == Some(b + stable_len)
        {
            stable_len += 1;
        }

        if stable_len > 0 {
            result.push(Chunk::stable(o, a, b, stable_len));
            (o, a, b) = (o + stable_len, a + stable_len, b + stable_len);
            continue;
        }

        // next ancestor line present on both sides starts the following stable run
        let next_stable = (o..base.len()).find_map(|line| {
            Some((line, in_ours[line]?, in_theirs[line]?))
        });

        match next_stable {
            Some((next_o, next_a, next_b)) => {
                result.push(Chunk::unstable(o..next_o, a..next_a, b..next_b));
                (o, a, b) = (next_o, next_a, next_b);
            }
            None => {
                if o < base.len() || a < ours.len() || b < theirs.len() {
                    result.push(Chunk::unstable(o..base.len(), a..ours.len(), b..theirs.len()));
                }
                break;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn lines(text: &str) -> Vec<&[u8]> {
        split_lines(text.as_bytes())
    }

    #[rstest]
    fn split_keeps_terminators() {
        assert_eq!(
            split_lines(b"a\nb\nc"),
            vec![b"a\n".as_slice(), b"b\n", b"c"]
        );
        assert!(split_lines(b"").is_empty());
    }

    #[rstest]
    fn separated_edits_give_separate_chunks() {
        let base = lines("1\n2\n3\n4\n5\n");
        let ours = lines("1\nTWO\n3\n4\n5\n");
        let theirs = lines("1\n2\n3\nFOUR\n5\n");

        let kinds = chunks(&base, &ours, &theirs, DiffStrategy::Minimal)
            .into_iter()
            .map(|chunk| (chunk.kind, chunk.base))
            .collect::<Vec<_>>();

        assert_eq!(
            kinds,
            vec![
                (ChunkKind::Stable, 0..1),
                (ChunkKind::Unstable, 1..2),
                (ChunkKind::Stable, 2..3),
                (ChunkKind::Unstable, 3..4),
                (ChunkKind::Stable, 4..5),
            ]
        );
    }

    #[rstest]
    fn trailing_insertions_form_a_final_chunk() {
        let base = lines("a\n");
        let ours = lines("a\nb\n");
        let theirs = lines("a\n");

        assert_eq!(
            chunks(&base, &ours, &theirs, DiffStrategy::Patience),
            vec![
                Chunk::stable(0, 0, 0, 1),
                Chunk::unstable(1..1, 1..2, 1..1)
            ]
        );
    }

    proptest! {
        #[test]
        fn chunks_tile_all_inputs(
            base in proptest::collection::vec("[abc]\n", 0..12),
            ours in proptest::collection::vec("[abc]\n", 0..12),
            theirs in proptest::collection::vec("[abc]\n", 0..12),
        ) {
            let base = base.iter().map(|line| line.as_bytes()).collect::<Vec<_>>();
            let ours = ours.iter().map(|line| line.as_bytes()).collect::<Vec<_>>();
            let theirs = theirs.iter().map(|line| line.as_bytes()).collect::<Vec<_>>();

            let (mut o, mut a, mut b) = (0, 0, 0);
            for chunk in chunks(&base, &ours, &theirs, DiffStrategy::Minimal) {
                prop_assert_eq!((chunk.base.start, chunk.ours.start, chunk.theirs.start), (o, a, b));
                if chunk.kind == ChunkKind::Stable {
                    for i in 0..chunk.base.len() {
                        prop_assert_eq!(base[chunk.base.start + i], ours[chunk.ours.start + i]);
                        prop_assert_eq!(base[chunk.base.start + i], theirs[chunk.theirs.start + i]);
                    }
                }
                (o, a, b) = (chunk.base.end, chunk.ours.end, chunk.theirs.end);
            }
            prop_assert_eq!((o, a, b), (base.len(), ours.len(), theirs.len()));
        }
    }
}
