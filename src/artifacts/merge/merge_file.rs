//! Three-way merge of file contents
//!
//! Unstable chunks changed on one side only take that side; chunks changed
//! identically on both sides take the shared change. Anything else is a
//! conflict, written between markers unless a [`MergeFavor`] resolves it:
//!
//! ```text
//! <<<<<<< ours
//! our lines
//! ||||||| base        (diff3 style only)
//! ancestor lines
//! =======
//! their lines
//! >>>>>>> theirs
//! ```

use crate::artifacts::diff::DiffStrategy;
use crate::artifacts::merge::diff3::{Chunk, ChunkKind, chunks, split_lines};
use crate::artifacts::objects::blob::is_binary;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::ops::Range;
use tracing::{trace, warn};

pub const DEFAULT_MARKER_SIZE: usize = 7;

/// How conflicting chunks are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeFavor {
    /// Leave conflict markers
    #[default]
    Normal,
    Ours,
    Theirs,
    /// Our lines followed by theirs, without markers
    Union,
}

impl MergeFavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeFavor::Normal => "normal",
            MergeFavor::Ours => "ours",
            MergeFavor::Theirs => "theirs",
            MergeFavor::Union => "union",
        }
    }
}

impl TryFrom<&str> for MergeFavor {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "normal" => Ok(MergeFavor::Normal),
            "ours" => Ok(MergeFavor::Ours),
            "theirs" => Ok(MergeFavor::Theirs),
            "union" => Ok(MergeFavor::Union),
            _ => Err(Error::InvalidArgument(format!("unknown merge favor '{value}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictStyle {
    #[default]
    Merge,
    /// Also show the ancestor lines between `|||||||` and `=======`
    Diff3,
}

impl ConflictStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStyle::Merge => "merge",
            ConflictStyle::Diff3 => "diff3",
        }
    }
}

impl TryFrom<&str> for ConflictStyle {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "merge" => Ok(ConflictStyle::Merge),
            "diff3" => Ok(ConflictStyle::Diff3),
            _ => Err(Error::InvalidArgument(format!("unknown conflict style '{value}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFileOptions {
    pub ancestor_label: String,
    pub our_label: String,
    pub their_label: String,
    pub favor: MergeFavor,
    pub style: ConflictStyle,
    pub strategy: DiffStrategy,
    pub marker_size: usize,
}

impl Default for MergeFileOptions {
    fn default() -> Self {
        MergeFileOptions {
            ancestor_label: "base".to_string(),
            our_label: "ours".to_string(),
            their_label: "theirs".to_string(),
            favor: MergeFavor::default(),
            style: ConflictStyle::default(),
            strategy: DiffStrategy::default(),
            marker_size: DEFAULT_MARKER_SIZE,
        }
    }
}

impl MergeFileOptions {
    pub fn with_labels(
        mut self,
        ancestor: impl Into<String>,
        ours: impl Into<String>,
        theirs: impl Into<String>,
    ) -> Self {
        self.ancestor_label = ancestor.into();
        self.our_label = ours.into();
        self.their_label = theirs.into();
        self
    }

    pub fn with_favor(mut self, favor: MergeFavor) -> Self {
        self.favor = favor;
        self
    }

    pub fn with_style(mut self, style: ConflictStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_strategy(mut self, strategy: DiffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_marker_size(mut self, marker_size: usize) -> Self {
        self.marker_size = marker_size.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFileResult {
    /// No conflict markers were written
    pub automergeable: bool,
    pub content: Bytes,
    /// Number of conflict regions in `content`
    pub conflicts: usize,
}

pub fn merge_file(
    ancestor: &[u8],
    ours: &[u8],
    theirs: &[u8],
    options: &MergeFileOptions,
) -> Result<MergeFileResult> {
    if is_binary(ancestor) || is_binary(ours) || is_binary(theirs) {
        return Err(Error::BinaryConflict);
    }

    let base_lines = split_lines(ancestor);
    let our_lines = split_lines(ours);
    let their_lines = split_lines(theirs);

    let mut merger = Merger {
        base: &base_lines,
        ours: &our_lines,
        theirs: &their_lines,
        options,
        output: Vec::with_capacity(ours.len().max(theirs.len())),
        conflicts: 0,
    };
    for chunk in chunks(&base_lines, &our_lines, &their_lines, options.strategy) {
        merger.apply(chunk);
    }

    if merger.conflicts > 0 {
        warn!(conflicts = merger.conflicts, "merge left conflicts");
    }

    Ok(MergeFileResult {
        automergeable: merger.conflicts == 0,
        conflicts: merger.conflicts,
        content: Bytes::from(merger.output),
    })
}

struct Merger<'m> {
    base: &'m [&'m [u8]],
    ours: &'m [&'m [u8]],
    theirs: &'m [&'m [u8]],
    options: &'m MergeFileOptions,
    output: Vec<u8>,
    conflicts: usize,
}

impl<'m> Merger<'m> {
    fn apply(&mut self, chunk: Chunk) {
        let (base_all, ours_all, theirs_all) = (self.base, self.ours, self.theirs);
        let base = &base_all[chunk.base.clone()];
        let ours = &ours_all[chunk.ours.clone()];
        let theirs = &theirs_all[chunk.theirs.clone()];

        match chunk.kind {
            ChunkKind::Stable => self.emit(ours),
            ChunkKind::Unstable if ours == base => {
                trace!(base = ?chunk.base, "taking their change");
                self.emit(theirs);
            }
            ChunkKind::Unstable if theirs == base || ours == theirs => {
                trace!(base = ?chunk.base, "taking our change");
                self.emit(ours);
            }
            ChunkKind::Unstable => self.conflict(chunk.base, chunk.ours, chunk.theirs),
        }
    }

    fn conflict(&mut self, base: Range<usize>, ours: Range<usize>, theirs: Range<usize>) {
        let (base_all, ours_all, theirs_all, options) =
            (self.base, self.ours, self.theirs, self.options);
        let base_lines = &base_all[base];
        let mut our_lines = &ours_all[ours];
        let mut their_lines = &theirs_all[theirs];

        // lines both sides agree on stay outside the markers
        let (mut prefix, mut suffix): (&[&[u8]], &[&[u8]]) = (&[], &[]);
        if options.style == ConflictStyle::Merge {
            let prefix_len = common_prefix(our_lines, their_lines);
            prefix = &our_lines[..prefix_len];
            (our_lines, their_lines) = (&our_lines[prefix_len..], &their_lines[prefix_len..]);

            let suffix_len = common_suffix(our_lines, their_lines);
            suffix = &our_lines[our_lines.len() - suffix_len..];
            our_lines = &our_lines[..our_lines.len() - suffix_len];
            their_lines = &their_lines[..their_lines.len() - suffix_len];
        }

        trace!(
            ours = our_lines.len(),
            theirs = their_lines.len(),
            favor = ?options.favor,
            "conflicting change"
        );
        self.emit(prefix);

        match options.favor {
            MergeFavor::Ours => self.emit(our_lines),
            MergeFavor::Theirs => self.emit(their_lines),
            MergeFavor::Union => {
                self.emit(our_lines);
                self.emit(their_lines);
            }
            MergeFavor::Normal => {
                self.conflicts += 1;
                self.marker('<', &options.our_label);
                self.emit_terminated(our_lines);
                if options.style == ConflictStyle::Diff3 {
                    self.marker('|', &options.ancestor_label);
                    self.emit_terminated(base_lines);
                }
                self.marker('=', "");
                self.emit_terminated(their_lines);
                self.marker('>', &options.their_label);
            }
        }

        self.emit(suffix);
    }

    fn emit(&mut self, lines: &[&[u8]]) {
        for line in lines {
            self.output.extend_from_slice(line);
        }
    }

    /// Emit lines so that whatever follows starts on a new line
    fn emit_terminated(&mut self, lines: &[&[u8]]) {
        self.emit(lines);
        if lines.last().is_some_and(|line| !line.ends_with(b"\n")) {
            self.output.push(b'\n');
        }
    }

    fn marker(&mut self, marker: char, label: &str) {
        let mut line = marker.to_string().repeat(self.options.marker_size);
        if !label.is_empty() {
            line.push(' ');
            line.push_str(label);
        }
        line.push('\n');
        self.output.extend_from_slice(line.as_bytes());
    }
}

fn common_prefix(a: &[&[u8]], b: &[&[u8]]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[&[u8]], b: &[&[u8]]) -> usize {
    a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    const BASE: &str = "one\ntwo\nthree\nfour\nfive\n";

    #[fixture]
    fn options() -> MergeFileOptions {
        MergeFileOptions::default()
    }

    fn merge(ours: &str, theirs: &str, options: &MergeFileOptions) -> MergeFileResult {
        merge_file(BASE.as_bytes(), ours.as_bytes(), theirs.as_bytes(), options).unwrap()
    }

    fn text(result: &MergeFileResult) -> &str {
        std::str::from_utf8(&result.content).unwrap()
    }

    #[rstest]
    fn identical_inputs_merge_to_themselves(options: MergeFileOptions) {
        let result = merge(BASE, BASE, &options);

        assert!(result.automergeable);
        assert_eq!(text(&result), BASE);
    }

    #[rstest]
    #[case(DiffStrategy::Minimal)]
    #[case(DiffStrategy::Patience)]
    fn separate_edits_are_combined(options: MergeFileOptions, #[case] strategy: DiffStrategy) {
        let result = merge(
            "ONE\ntwo\nthree\nfour\nfive\n",
            "one\ntwo\nthree\nfour\nFIVE\n",
            &options.with_strategy(strategy),
        );

        assert!(result.automergeable);
        assert_eq!(result.conflicts, 0);
        assert_eq!(text(&result), "ONE\ntwo\nthree\nfour\nFIVE\n");
    }

    #[rstest]
    fn same_change_on_both_sides_is_clean(options: MergeFileOptions) {
        let changed = "one\ntwo\n3\nfour\nfive\n";

        let result = merge(changed, changed, &options);

        assert!(result.automergeable);
        assert_eq!(text(&result), changed);
    }

    #[rstest]
    fn overlapping_edits_conflict_with_labels(options: MergeFileOptions) {
        let result = merge(
            "one\ntwo\nmine\nfour\nfive\n",
            "one\ntwo\nyours\nfour\nfive\n",
            &options.with_labels("base", "HEAD", "feature"),
        );

        assert!(!result.automergeable);
        assert_eq!(result.conflicts, 1);
        assert_eq!(
            text(&result),
            "one\ntwo\n<<<<<<< HEAD\nmine\n=======\nyours\n>>>>>>> feature\nfour\nfive\n"
        );
    }

    #[rstest]
    fn diff3_style_shows_the_ancestor(options: MergeFileOptions) {
        let result = merge(
            "one\ntwo\nmine\nfour\nfive\n",
            "one\ntwo\nyours\nfour\nfive\n",
            &options.with_style(ConflictStyle::Diff3).with_marker_size(3),
        );

        assert_eq!(
            text(&result),
            "one\ntwo\n<<< ours\nmine\n||| base\nthree\n===\nyours\n>>> theirs\nfour\nfive\n"
        );
    }

    #[rstest]
    fn common_lines_are_moved_out_of_conflicts(options: MergeFileOptions) {
        let result = merge(
            "one\ntwo\nsame\nmine\nend\nfour\nfive\n",
            "one\ntwo\nsame\nyours\nend\nfour\nfive\n",
            &options,
        );

        assert_eq!(
            text(&result),
            "one\ntwo\nsame\n<<<<<<< ours\nmine\n=======\nyours\n>>>>>>> theirs\nend\nfour\nfive\n"
        );
    }

    #[rstest]
    #[case(MergeFavor::Ours, "one\ntwo\nmine\nfour\nfive\n")]
    #[case(MergeFavor::Theirs, "one\ntwo\nyours\nfour\nfive\n")]
    #[case(MergeFavor::Union, "one\ntwo\nmine\nyours\nfour\nfive\n")]
    fn favor_resolves_conflicts(
        options: MergeFileOptions,
        #[case] favor: MergeFavor,
        #[case] expected: &str,
    ) {
        let result = merge(
            "one\ntwo\nmine\nfour\nfive\n",
            "one\ntwo\nyours\nfour\nfive\n",
            &options.with_favor(favor),
        );

        assert!(result.automergeable);
        assert_eq!(text(&result), expected);
    }

    #[rstest]
    fn missing_final_newline_is_kept_or_terminated(options: MergeFileOptions) {
        let clean = merge_file(b"a\nb", b"A\nb", b"a\nb", &options).unwrap();
        assert_eq!(clean.content.as_ref(), b"A\nb");

        let conflicted = merge_file(b"a\nb", b"a\nmine", b"a\nyours", &options).unwrap();
        assert_eq!(
            conflicted.content.as_ref(),
            b"a\n<<<<<<< ours\nmine\n=======\nyours\n>>>>>>> theirs\n"
        );
    }

    #[rstest]
    fn empty_labels_drop_the_space(options: MergeFileOptions) {
        let result = merge_file(b"x\n", b"y\n", b"z\n", &options.with_labels("", "", "")).unwrap();

        assert_eq!(result.content.as_ref(), b"<<<<<<<\ny\n=======\nz\n>>>>>>>\n");
    }

    #[rstest]
    fn binary_inputs_are_refused(options: MergeFileOptions) {
        let err = merge_file(b"text\n", b"bin\0ary", b"text\n", &options).unwrap_err();

        assert!(matches!(err, Error::BinaryConflict));
    }

    proptest! {
        #[test]
        fn one_sided_changes_always_merge_to_that_side(
            base in proptest::collection::vec("[a-d]{1,3}\n", 0..10),
            theirs in proptest::collection::vec("[a-d]{1,3}\n", 0..10),
        ) {
            let base = base.concat();
            let theirs = theirs.concat();

            let result = merge_file(
                base.as_bytes(),
                base.as_bytes(),
                theirs.as_bytes(),
                &MergeFileOptions::default(),
            ).unwrap();

            prop_assert!(result.automergeable);
            prop_assert_eq!(result.content.as_ref(), theirs.as_bytes());
        }
    }
}
