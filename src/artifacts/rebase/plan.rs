use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::rebase::operation::{OperationKind, RebaseOperation};
use crate::errors::{Error, Result};

/// Progress of the operation under the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Applied to the index and working tree, not committed yet
    Pending,
    /// Committed, skipped as already applied, or an `exec`
    Done,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Done => "done",
        }
    }
}

impl TryFrom<&str> for StepState {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(StepState::Pending),
            "done" => Ok(StepState::Done),
            _ => Err(Error::malformed(format!("unknown rebase step state '{value}'"))),
        }
    }
}

/// Everything a rebase needs to resume after the process exits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebasePlan {
    pub operations: Vec<RebaseOperation>,
    /// Index of the last operation handed out by `next`
    pub cursor: Option<usize>,
    pub step: StepState,
    pub onto: ObjectId,
    pub orig_head: ObjectId,
    /// Branch being rebased, `None` when `HEAD` was detached
    pub head_name: Option<BranchName>,
    /// Tip of the rewritten history so far
    pub head: ObjectId,
    /// `(original, rewritten)` pairs in commit order
    pub rewritten: Vec<(ObjectId, ObjectId)>,
}

impl RebasePlan {
    pub fn new(
        operations: Vec<RebaseOperation>,
        onto: ObjectId,
        orig_head: ObjectId,
        head_name: Option<BranchName>,
    ) -> Result<Self> {
        Self::validate(&operations)?;

        Ok(RebasePlan {
            operations,
            cursor: None,
            step: StepState::Done,
            head: onto.clone(),
            onto,
            orig_head,
            head_name,
            rewritten: Vec::new(),
        })
    }

    /// A squash or fixup needs some commit before it to fold into
    pub fn validate(operations: &[RebaseOperation]) -> Result<()> {
        let first_commit = operations
            .iter()
            .find(|operation| operation.kind() != OperationKind::Exec);

        match first_commit {
            Some(operation) if operation.kind().folds_into_previous() => {
                Err(Error::InvalidArgument(format!(
                    "cannot {} without a previous commit",
                    operation.kind()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Index the next call to `next` hands out
    pub fn next_index(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor + 1)
    }

    pub fn remaining(&self) -> usize {
        self.operations.len().saturating_sub(self.next_index())
    }

    pub fn current(&self) -> Option<&RebaseOperation> {
        self.operations.get(self.cursor?)
    }

    /// Record a new tip; commits folded into the previous tip follow it
    pub fn record(&mut self, original: ObjectId, rewritten: ObjectId, folded: bool) {
        if folded {
            for (_, new) in self.rewritten.iter_mut().filter(|(_, new)| *new == self.head) {
                *new = rewritten.clone();
            }
        }

        self.rewritten.push((original, rewritten.clone()));
        self.head = rewritten;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::hash::HashAlgorithm;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn oid(seed: &str) -> ObjectId {
        HashAlgorithm::Sha1.digest(seed.as_bytes())
    }

    fn operation(kind: OperationKind, seed: &str) -> RebaseOperation {
        RebaseOperation::try_new(kind, oid(seed)).unwrap()
    }

    #[rstest]
    #[case(vec![operation(OperationKind::Squash, "a")])]
    #[case(vec![RebaseOperation::exec("true"), operation(OperationKind::Fixup, "a")])]
    fn folding_needs_a_previous_commit(#[case] operations: Vec<RebaseOperation>) {
        assert!(matches!(
            RebasePlan::validate(&operations),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn cursor_tracks_remaining_operations() {
        let mut plan = RebasePlan::new(
            vec![operation(OperationKind::Pick, "a"), operation(OperationKind::Squash, "b")],
            oid("onto"),
            oid("orig"),
            None,
        )
        .unwrap();

        assert_eq!((plan.next_index(), plan.remaining()), (0, 2));
        assert!(plan.current().is_none());

        plan.cursor = Some(1);
        assert_eq!(plan.remaining(), 0);
        assert_eq!(plan.current().map(RebaseOperation::kind), Some(OperationKind::Squash));
    }

    #[rstest]
    fn folded_commits_point_at_the_new_tip() {
        let mut plan = RebasePlan::new(Vec::new(), oid("onto"), oid("orig"), None).unwrap();

        plan.record(oid("a"), oid("a'"), false);
        plan.record(oid("b"), oid("ab'"), true);

        assert_eq!(
            plan.rewritten,
            vec![(oid("a"), oid("ab'")), (oid("b"), oid("ab'"))]
        );
        assert_eq!(plan.head, oid("ab'"));
    }
}
