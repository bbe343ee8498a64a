//! Interactive rebase engine
//!
//! A rebase replays the commits reachable from a branch but not from an
//! upstream onto a new base, one operation at a time:
//!
//! 1. [`Rebase::start`] plans the operations, saves the plan and detaches
//!    `HEAD` at the new base.
//! 2. [`Rebase::next`] applies the next operation to the index and working
//!    tree. Conflicts are reported, not raised.
//! 3. [`Rebase::commit`] records the applied operation once it is resolved.
//! 4. [`Rebase::finish`] moves the branch to the rewritten history, or
//!    [`Rebase::abort`] puts everything back the way it was.
//!
//! The plan is saved under `.git/rebase-merge` before each step touches the
//! repository, so a rebase survives the process and can be picked up again
//! with [`Rebase::open`].

use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::merge::merge_file::MergeFileOptions;
use crate::artifacts::merge::tree_merge::merge_trees;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::signature::Signature;
use crate::artifacts::rebase::operation::{OperationKind, RebaseOperation};
use crate::artifacts::rebase::plan::{RebasePlan, StepState};
use crate::artifacts::rebase::state_dir::RebaseStateDir;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::fmt;
use tracing::{debug, info, warn};

/// Rewrites the planned operations before the rebase starts
pub type PlanEditor = Box<dyn FnOnce(&mut Vec<RebaseOperation>)>;

#[derive(Default)]
pub struct RebaseOptions {
    /// Used for every file merge; labels are replaced per operation
    pub merge_options: MergeFileOptions,
    pub edit_plan: Option<PlanEditor>,
}

impl RebaseOptions {
    pub fn with_merge_options(mut self, merge_options: MergeFileOptions) -> Self {
        self.merge_options = merge_options;
        self
    }

    pub fn with_plan_editor(mut self, editor: impl FnOnce(&mut Vec<RebaseOperation>) + 'static) -> Self {
        self.edit_plan = Some(Box::new(editor));
        self
    }
}

impl fmt::Debug for RebaseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebaseOptions")
            .field("merge_options", &self.merge_options)
            .field("edit_plan", &self.edit_plan.as_ref().map(|_| "<editor>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseState {
    NotStarted,
    InProgress,
    Finished,
    Aborted,
}

/// What [`Rebase::next`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    /// Applied cleanly, ready to commit; `exec` operations are only handed out
    Applied(RebaseOperation),
    /// Applied with conflicts left in the index and working tree
    Conflicted {
        operation: RebaseOperation,
        paths: Vec<String>,
    },
    /// No operation left
    Done,
}

#[derive(Debug)]
pub struct Rebase<'r> {
    repository: &'r mut Repository,
    state_dir: RebaseStateDir,
    plan: RebasePlan,
    state: RebaseState,
    merge_options: MergeFileOptions,
}

impl<'r> Rebase<'r> {
    /// Whether a rebase is recorded in the repository
    pub fn status(repository: &Repository) -> RebaseState {
        if RebaseStateDir::new(repository.rebase_path()).exists() {
            RebaseState::InProgress
        } else {
            RebaseState::NotStarted
        }
    }

    /// Plan the commits of `branch` (the current branch when `None`) missing
    /// from `upstream`, and move `HEAD` to `onto` (`upstream` when `None`)
    ///
    /// Merge commits in the range are left out.
    pub fn start(
        repository: &'r mut Repository,
        branch: Option<&str>,
        upstream: &ObjectId,
        onto: Option<&ObjectId>,
        mut options: RebaseOptions,
    ) -> Result<Self> {
        let state_dir = RebaseStateDir::new(repository.rebase_path());
        if state_dir.exists() {
            return Err(Error::InvalidState("a rebase is already in progress".to_string()));
        }
        if !repository.is_clean()? {
            return Err(Error::InvalidState(
                "working tree has uncommitted changes".to_string(),
            ));
        }

        let (head_name, orig_head) = match branch {
            Some(name) => {
                let branch = BranchName::try_parse(name)?;
                let tip = repository
                    .refs()
                    .read_branch(&branch)?
                    .ok_or_else(|| Error::NotFound(format!("branch {branch}")))?;
                (Some(branch), tip)
            }
            None => {
                let tip = repository
                    .head_commit()?
                    .ok_or_else(|| Error::NotFound("commit on HEAD".to_string()))?;
                (repository.refs().current_branch()?, tip)
            }
        };
        let onto = onto.unwrap_or(upstream).clone();

        let database = repository.database();
        database.load_commit(upstream)?;
        database.load_commit(&onto)?;

        let mut operations = RevList::new(database, orig_head.clone(), Some(upstream.clone()))
            .oldest_first()?
            .into_iter()
            .filter(|(_, commit)| !commit.is_merge())
            .map(|(oid, _)| RebaseOperation::pick(oid))
            .collect::<Vec<_>>();
        if let Some(edit_plan) = options.edit_plan.take() {
            edit_plan(&mut operations);
        }

        let plan = RebasePlan::new(operations, onto.clone(), orig_head, head_name)?;
        repository.ensure_checkout_keeps_untracked(&onto)?;
        state_dir.write(&plan)?;
        state_dir.write_merge_options(&options.merge_options)?;

        repository.refs().set_head_detached(&onto)?;
        repository.checkout_tree(&onto)?;

        info!(
            onto = %onto,
            orig_head = %plan.orig_head,
            operations = plan.operations.len(),
            "started rebase"
        );
        Ok(Rebase {
            repository,
            state_dir,
            plan,
            state: RebaseState::InProgress,
            merge_options: options.merge_options,
        })
    }

    /// Resume the rebase recorded in the repository
    pub fn open(repository: &'r mut Repository) -> Result<Self> {
        let state_dir = RebaseStateDir::new(repository.rebase_path());
        let plan = state_dir.read()?;
        let merge_options = state_dir.read_merge_options()?;

        debug!(cursor = ?plan.cursor, operations = plan.operations.len(), "opened rebase");
        Ok(Rebase {
            repository,
            state_dir,
            plan,
            state: RebaseState::InProgress,
            merge_options,
        })
    }

    /// Replace the file merge settings for the remaining operations
    pub fn set_merge_options(&mut self, merge_options: MergeFileOptions) -> Result<()> {
        self.state_dir.write_merge_options(&merge_options)?;
        self.merge_options = merge_options;
        Ok(())
    }

    pub fn merge_options(&self) -> &MergeFileOptions {
        &self.merge_options
    }

    pub fn repository(&self) -> &Repository {
        &*self.repository
    }

    /// Mutable access for resolving conflicts between `next` and `commit`
    pub fn repository_mut(&mut self) -> &mut Repository {
        &mut *self.repository
    }

    pub fn state(&self) -> RebaseState {
        self.state
    }

    pub fn operation_count(&self) -> usize {
        self.plan.operations.len()
    }

    pub fn operation(&self, index: usize) -> Option<&RebaseOperation> {
        self.plan.operations.get(index)
    }

    pub fn current_operation(&self) -> Option<&RebaseOperation> {
        self.plan.current()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.plan.cursor
    }

    pub fn onto(&self) -> &ObjectId {
        &self.plan.onto
    }

    pub fn orig_head(&self) -> &ObjectId {
        &self.plan.orig_head
    }

    /// Tip of the rewritten history so far
    pub fn head(&self) -> &ObjectId {
        &self.plan.head
    }

    pub fn rewritten(&self) -> &[(ObjectId, ObjectId)] {
        &self.plan.rewritten
    }

    /// Apply the next operation
    ///
    /// An operation applied but never committed is discarded first.
    pub fn next(&mut self) -> Result<NextOutcome> {
        self.ensure_in_progress()?;

        if self.plan.step == StepState::Pending {
            let head = self.plan.head.clone();
            if let Some(skipped) = self.plan.current() {
                warn!(operation = %skipped, "discarding uncommitted operation");
            }
            self.repository.checkout_tree(&head)?;
        }

        let index = self.plan.next_index();
        let Some(operation) = self.plan.operations.get(index).cloned() else {
            return Ok(NextOutcome::Done);
        };

        let Some(id) = operation.id() else {
            self.plan.cursor = Some(index);
            self.plan.step = StepState::Done;
            self.state_dir.write(&self.plan)?;

            debug!(index, operation = %operation, "handing out exec");
            return Ok(NextOutcome::Applied(operation));
        };

        let commit = self.repository.database().load_commit(id)?;
        let options = self.step_merge_options(id, &commit);
        let result = merge_trees(
            self.repository.database(),
            commit.parent(),
            Some(&self.plan.head),
            Some(commit.tree_oid()),
            &options,
        )?;
        self.repository.ensure_merge_keeps_untracked(&result)?;

        self.plan.cursor = Some(index);
        self.plan.step = StepState::Pending;
        self.state_dir.write(&self.plan)?;
        self.repository.apply_merge(&result)?;

        if result.is_clean() {
            debug!(index, operation = %operation, "applied operation");
            Ok(NextOutcome::Applied(operation))
        } else {
            let paths = result.conflicted_paths();
            warn!(index, operation = %operation, conflicts = paths.len(), "operation conflicted");
            Ok(NextOutcome::Conflicted { operation, paths })
        }
    }

    /// Commit the applied operation with the original author and message
    pub fn commit(&mut self, committer: Signature) -> Result<ObjectId> {
        self.commit_with(committer, None, None)
    }

    /// Commit the applied operation, overriding author and message
    ///
    /// Fails with [`Error::Conflict`] while the index holds conflicts, and with
    /// [`Error::AlreadyApplied`] when a pick would not change the tree; the
    /// operation then counts as done.
    pub fn commit_with(
        &mut self,
        committer: Signature,
        author: Option<Signature>,
        message: Option<Bytes>,
    ) -> Result<ObjectId> {
        self.ensure_in_progress()?;

        let operation = match self.plan.current() {
            Some(operation) if self.plan.step == StepState::Pending => operation.clone(),
            _ => {
                return Err(Error::InvalidState(
                    "no applied operation to commit".to_string(),
                ));
            }
        };
        let Some(id) = operation.id() else {
            return Err(Error::InvalidState("exec operations have nothing to commit".to_string()));
        };

        let index = self.repository.index();
        if index.has_conflicts() {
            return Err(Error::Conflict(index.conflicted_paths()));
        }

        let database = self.repository.database();
        let tree = index.write_tree(database)?;
        let original = database.load_commit(id)?;
        let head = database.load_commit(&self.plan.head)?;

        // nothing rewritten yet, so there is no commit of ours to fold into
        let folded = operation.kind().folds_into_previous() && self.plan.head != self.plan.onto;
        if operation.kind().folds_into_previous() && !folded {
            debug!(operation = %operation, "nothing to fold into, committing on its own");
        }
        let commit = if folded {
            let message = message.unwrap_or_else(|| match operation.kind() {
                OperationKind::Squash => squash_message(head.message(), original.message()),
                _ => head.message().clone(),
            });
            Commit::new(
                tree,
                head.parents().to_vec(),
                author.unwrap_or_else(|| head.author().clone()),
                committer,
                message,
            )
        } else {
            if tree == *head.tree_oid() {
                self.plan.step = StepState::Done;
                self.state_dir.write(&self.plan)?;
                info!(commit = %id, "changes already applied, skipping");
                return Err(Error::AlreadyApplied(id.clone()));
            }

            Commit::new(
                tree,
                vec![self.plan.head.clone()],
                author.unwrap_or_else(|| original.author().clone()),
                committer,
                message.unwrap_or_else(|| original.message().clone()),
            )
        };
        let oid = database.store(&commit)?;

        self.plan.record(id.clone(), oid.clone(), folded);
        self.plan.step = StepState::Done;
        self.state_dir.write(&self.plan)?;
        self.repository.refs().set_head_detached(&oid)?;

        debug!(original = %id, rewritten = %oid, kind = %operation.kind(), "committed operation");
        Ok(oid)
    }

    /// Point the rebased branch at the rewritten history
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_in_progress()?;

        let remaining = self.plan.remaining();
        if remaining > 0 {
            return Err(Error::OperationsRemaining { remaining });
        }
        if self.plan.step == StepState::Pending {
            return Err(Error::InvalidState(
                "the last operation has not been committed".to_string(),
            ));
        }

        let head = self.plan.head.clone();
        self.restore_head(&head)?;
        self.state_dir.remove()?;
        self.state = RebaseState::Finished;

        info!(head = %head, rewritten = self.plan.rewritten.len(), "finished rebase");
        Ok(())
    }

    /// Return branch, `HEAD`, index and working tree to where they were
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_in_progress()?;

        let orig_head = self.plan.orig_head.clone();
        self.restore_head(&orig_head)?;
        self.repository.checkout_tree(&orig_head)?;
        self.state_dir.remove()?;
        self.state = RebaseState::Aborted;

        info!(orig_head = %orig_head, "aborted rebase");
        Ok(())
    }

    fn restore_head(&self, oid: &ObjectId) -> Result<()> {
        let refs = self.repository.refs();
        match &self.plan.head_name {
            Some(branch) => {
                refs.update_branch(branch, oid)?;
                refs.set_head_symbolic(branch)
            }
            None => refs.set_head_detached(oid),
        }
    }

    fn ensure_in_progress(&self) -> Result<()> {
        match self.state {
            RebaseState::InProgress => Ok(()),
            state => Err(Error::InvalidState(format!("rebase is {state:?}"))),
        }
    }

    fn step_merge_options(&self, id: &ObjectId, commit: &Commit) -> MergeFileOptions {
        let short = id.to_short_oid();
        self.merge_options.clone().with_labels(
            format!("parent of {short}"),
            "HEAD",
            format!("{short} ({})", commit.short_message()),
        )
    }
}

fn squash_message(previous: &Bytes, squashed: &Bytes) -> Bytes {
    let previous = previous.trim_ascii_end();
    let mut message = Vec::with_capacity(previous.len() + squashed.len() + 2);
    message.extend_from_slice(previous);
    message.extend_from_slice(b"\n\n");
    message.extend_from_slice(squashed);
    Bytes::from(message)
}
