//! On-disk rebase state
//!
//! One small file per field under `.git/rebase-merge`:
//!
//! ```text
//! head-name        refs/heads/<branch> or "detached HEAD"
//! onto             <oid>
//! orig-head        <oid>
//! rewritten-head   <oid>, tip of the rewritten history
//! git-rebase-todo  one "<kind> <oid>" or "exec <command>" per line
//! msgnum           1-based index of the current operation, absent before the first
//! step             pending | done
//! rewritten-list   "<original> <rewritten>" per line
//! merge-options    "<key> <value>" per line: favor, style, strategy, marker-size
//! ```
//!
//! Every file is replaced through a temporary file and a rename.

use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::diff::DiffStrategy;
use crate::artifacts::merge::merge_file::{ConflictStyle, MergeFavor, MergeFileOptions};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::rebase::operation::RebaseOperation;
use crate::artifacts::rebase::plan::{RebasePlan, StepState};
use crate::errors::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

const DETACHED_HEAD: &str = "detached HEAD";

#[derive(Debug, Clone)]
pub struct RebaseStateDir {
    path: PathBuf,
}

impl RebaseStateDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RebaseStateDir { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.join("onto").is_file()
    }

    pub fn write(&self, plan: &RebasePlan) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;

        let head_name = match &plan.head_name {
            Some(branch) => branch.to_sym_ref_name().as_ref_path().to_string(),
            None => DETACHED_HEAD.to_string(),
        };
        let todo = plan
            .operations
            .iter()
            .map(|operation| format!("{operation}\n"))
            .collect::<String>();
        let rewritten = plan
            .rewritten
            .iter()
            .map(|(original, rewritten)| format!("{original} {rewritten}\n"))
            .collect::<String>();

        self.write_field("head-name", &head_name)?;
        self.write_field("onto", &plan.onto.to_string())?;
        self.write_field("orig-head", &plan.orig_head.to_string())?;
        self.write_field("rewritten-head", &plan.head.to_string())?;
        self.write_field("git-rebase-todo", &todo)?;
        self.write_field("step", plan.step.as_str())?;
        self.write_field("rewritten-list", &rewritten)?;
        match plan.cursor {
            Some(cursor) => self.write_field("msgnum", &(cursor + 1).to_string())?,
            None => self.remove_field("msgnum")?,
        }

        trace!(path = %self.path.display(), cursor = ?plan.cursor, "saved rebase state");
        Ok(())
    }

    pub fn read(&self) -> Result<RebasePlan> {
        if !self.exists() {
            return Err(Error::NotFound("rebase in progress".to_string()));
        }

        let head_name = match self.read_field("head-name")?.as_str() {
            DETACHED_HEAD => None,
            name => Some(BranchName::try_parse_sym_ref_name(&SymRefName::new(
                name.to_string(),
            ))?),
        };
        let operations = self
            .read_field("git-rebase-todo")?
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .map(RebaseOperation::parse_line)
            .collect::<Result<Vec<_>>>()?;
        let rewritten = self
            .read_field("rewritten-list")?
            .lines()
            .map(|line| {
                let (original, rewritten) = line
                    .split_once(' ')
                    .ok_or_else(|| Error::malformed(format!("invalid rewritten entry '{line}'")))?;
                Ok((ObjectId::try_parse(original)?, ObjectId::try_parse(rewritten)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let cursor = match self.read_optional_field("msgnum")? {
            Some(msgnum) => {
                let msgnum = msgnum
                    .parse::<usize>()
                    .map_err(|_| Error::malformed(format!("invalid msgnum '{msgnum}'")))?;
                msgnum.checked_sub(1)
            }
            None => None,
        };

        Ok(RebasePlan {
            operations,
            cursor,
            step: StepState::try_from(self.read_field("step")?.as_str())?,
            onto: ObjectId::try_parse(self.read_field("onto")?)?,
            orig_head: ObjectId::try_parse(self.read_field("orig-head")?)?,
            head_name,
            head: ObjectId::try_parse(self.read_field("rewritten-head")?)?,
            rewritten,
        })
    }

    /// Save the file merge settings; labels are per operation and not kept
    pub fn write_merge_options(&self, options: &MergeFileOptions) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;

        let content = format!(
            "favor {}\nstyle {}\nstrategy {}\nmarker-size {}\n",
            options.favor.as_str(),
            options.style.as_str(),
            options.strategy.as_str(),
            options.marker_size,
        );
        self.write_field("merge-options", &content)
    }

    /// The saved file merge settings, defaults when none were saved
    pub fn read_merge_options(&self) -> Result<MergeFileOptions> {
        let mut options = MergeFileOptions::default();
        let Some(content) = self.read_optional_field("merge-options")? else {
            return Ok(options);
        };

        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| Error::malformed(format!("invalid merge option '{line}'")))?;
            let invalid = |err: Error| Error::malformed(format!("invalid merge option '{line}': {err}"));

            match key {
                "favor" => options.favor = MergeFavor::try_from(value).map_err(invalid)?,
                "style" => options.style = ConflictStyle::try_from(value).map_err(invalid)?,
                "strategy" => options.strategy = DiffStrategy::try_from(value).map_err(invalid)?,
                "marker-size" => {
                    let size = value
                        .parse::<usize>()
                        .map_err(|_| Error::malformed(format!("invalid marker size '{value}'")))?;
                    options = options.with_marker_size(size);
                }
                _ => trace!(key, "ignoring unknown merge option"),
            }
        }

        Ok(options)
    }

    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn write_field(&self, name: &str, content: &str) -> Result<()> {
        let target = self.path.join(name);
        let temp = self.path.join(format!("{name}.tmp"));

        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &target)?;
        Ok(())
    }

    fn remove_field(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.path.join(name)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn read_field(&self, name: &str) -> Result<String> {
        self.read_optional_field(name)?
            .ok_or_else(|| Error::malformed(format!("rebase state is missing '{name}'")))
    }

    fn read_optional_field(&self, name: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path.join(name)) {
            Ok(content) => Ok(Some(content.trim_end().to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
