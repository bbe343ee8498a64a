use crate::areas::database::Database;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use bitflags::bitflags;
use derive_new::new;
use std::collections::HashMap;
use tracing::trace;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    struct Mark: u8 {
        /// Reachable from an excluded revision
        const UNINTERESTING = 0b01;
        const SEEN = 0b10;
    }
}

/// Commits reachable from `include` and not from `exclude`
#[derive(Debug, new)]
pub struct RevList<'d> {
    database: &'d Database,
    include: ObjectId,
    exclude: Option<ObjectId>,
}

impl RevList<'_> {
    /// The range, parents before children
    pub fn oldest_first(&self) -> Result<Vec<(ObjectId, Commit)>> {
        let mut marks = HashMap::<ObjectId, Mark>::new();
        let mut commits = HashMap::<ObjectId, Commit>::new();

        if let Some(exclude) = &self.exclude {
            let mut pending = vec![exclude.clone()];
            while let Some(oid) = pending.pop() {
                let mark = marks.entry(oid.clone()).or_default();
                if mark.contains(Mark::UNINTERESTING) {
                    continue;
                }
                *mark |= Mark::UNINTERESTING;

                let commit = self.database.load_commit(&oid)?;
                pending.extend(commit.parents().iter().cloned());
            }
        }

        // post-order walk: a commit is emitted once all its parents are
        let mut range = Vec::new();
        let mut pending = vec![(self.include.clone(), false)];
        while let Some((oid, expanded)) = pending.pop() {
            if expanded {
                if let Some(commit) = commits.remove(&oid) {
                    range.push((oid, commit));
                }
                continue;
            }

            let mark = marks.entry(oid.clone()).or_default();
            if mark.intersects(Mark::UNINTERESTING | Mark::SEEN) {
                continue;
            }
            *mark |= Mark::SEEN;

            let commit = self.database.load_commit(&oid)?;
            pending.push((oid.clone(), true));
            pending.extend(commit.parents().iter().rev().map(|parent| (parent.clone(), false)));
            commits.insert(oid, commit);
        }

        trace!(commits = range.len(), "listed revision range");
        Ok(range)
    }
}
