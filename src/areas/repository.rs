//! Repository facade
//!
//! Ties the object database, index, references and working tree of one
//! repository together, and implements the operations that span them.

use crate::areas::config::{ConfigFile, RepositoryOptions};
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::{WorkingTree, Workspace};
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry, Stage};
use crate::artifacts::merge::tree_merge::TreeMergeResult;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::hash_object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const GIT_DIR: &str = ".git";

#[derive(Debug)]
pub struct Repository {
    git_path: Box<Path>,
    database: Database,
    index: Index,
    workspace: Workspace,
    refs: Refs,
}

impl Repository {
    /// Create an empty repository with `HEAD` on an unborn default branch
    pub fn init(path: impl AsRef<Path>, options: RepositoryOptions) -> Result<Self> {
        let path = path.as_ref();
        let git_path = path.join(GIT_DIR);

        if git_path.join("HEAD").exists() {
            return Err(Error::InvalidState(format!(
                "{} is already a repository",
                path.display()
            )));
        }
        let default_branch = BranchName::try_parse(options.default_branch.as_str())?;

        std::fs::create_dir_all(git_path.join("objects"))?;
        std::fs::create_dir_all(git_path.join("refs").join("heads"))?;
        ConfigFile::from_options(&options).write(&git_path.join("config"))?;

        let repository = Self::assemble(path, options.algorithm, options.flate_compression())?;
        repository.refs.set_head_symbolic(&default_branch)?;

        debug!(path = %path.display(), algorithm = %options.algorithm, "initialized repository");
        Ok(repository)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let git_path = path.join(GIT_DIR);

        if !git_path.join("HEAD").exists() {
            return Err(Error::NotFound(format!("repository at {}", path.display())));
        }

        let config = ConfigFile::read(&git_path.join("config"))?;
        let mut repository = Self::assemble(
            path,
            config.algorithm()?,
            flate2::Compression::new(config.compression()?),
        )?;
        repository.index.read()?;

        Ok(repository)
    }

    fn assemble(
        path: &Path,
        algorithm: HashAlgorithm,
        compression: flate2::Compression,
    ) -> Result<Self> {
        let path = path.canonicalize()?;
        let git_path = path.join(GIT_DIR);

        Ok(Repository {
            database: Database::loose(git_path.join("objects"), algorithm, compression),
            index: Index::new(git_path.join("index"), algorithm),
            workspace: Workspace::new(path),
            refs: Refs::new(git_path.clone().into_boxed_path()),
            git_path: git_path.into_boxed_path(),
        })
    }

    pub fn path(&self) -> &Path {
        self.workspace.path()
    }

    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.database.algorithm()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn head_commit(&self) -> Result<Option<ObjectId>> {
        self.refs.read_head()
    }

    /// Stage `pathspec`, a file or a directory (`.` for everything)
    ///
    /// Tracked files missing from the working tree are unstaged.
    pub fn add(&mut self, pathspec: &str) -> Result<()> {
        let pathspec = pathspec.trim_end_matches('/');
        let under = |path: &str| {
            pathspec == "." || path == pathspec || path.starts_with(&format!("{pathspec}/"))
        };

        let files = self
            .workspace
            .list_files()?
            .into_iter()
            .filter(|path| under(path))
            .collect::<BTreeSet<_>>();
        let deleted = self
            .index
            .entries()
            .map(|entry| entry.path.clone())
            .filter(|path| under(path) && !files.contains(path))
            .collect::<Vec<_>>();

        if files.is_empty() && deleted.is_empty() {
            return Err(Error::NotFound(format!("pathspec '{pathspec}'")));
        }

        for path in deleted {
            self.index.remove(&path);
        }
        for path in &files {
            self.index.add(path, &self.workspace, &self.database)?;
        }

        self.index.write()
    }

    /// Record the index as a new commit on top of `HEAD`
    pub fn commit(
        &mut self,
        author: Signature,
        committer: Signature,
        message: impl Into<Bytes>,
    ) -> Result<ObjectId> {
        let tree = self.index.write_tree(&self.database)?;
        let parents = self.head_commit()?.into_iter().collect::<Vec<_>>();

        let commit = Commit::new(tree, parents, author, committer, message);
        let oid = self.database.store(&commit)?;
        self.refs.update_head(&oid)?;

        debug!(commit = %oid, "committed");
        Ok(oid)
    }

    pub fn create_branch(&self, name: &str, start: Option<&ObjectId>) -> Result<BranchName> {
        let branch = BranchName::try_parse(name)?;
        let start = match start {
            Some(oid) => oid.clone(),
            None => self
                .head_commit()?
                .ok_or_else(|| Error::NotFound("commit on HEAD".to_string()))?,
        };
        self.database.load_commit(&start)?;

        self.refs.create_branch(&branch, &start)?;
        Ok(branch)
    }

    /// Switch to an existing branch
    pub fn checkout_branch(&mut self, name: &str) -> Result<()> {
        let branch = BranchName::try_parse(name)?;
        let target = self
            .refs
            .read_branch(&branch)?
            .ok_or_else(|| Error::NotFound(format!("branch {branch}")))?;

        if !self.is_clean()? {
            return Err(Error::InvalidState(
                "working tree has uncommitted changes".to_string(),
            ));
        }

        self.checkout_tree(&target)?;
        self.refs.set_head_symbolic(&branch)
    }

    /// Make the working tree and index match a tree (or a commit's tree)
    ///
    /// Tracked files absent from the tree are deleted, files whose content or
    /// mode differ are rewritten, untracked files are left alone. Fails with
    /// `InvalidState` before touching anything when an untracked file is in
    /// the way of the tree.
    pub fn checkout_tree(&mut self, oid: &ObjectId) -> Result<()> {
        let tree_oid = self.database.peel_to_tree(oid)?;
        let target = self.database.flatten_tree(&tree_oid)?;
        self.ensure_untracked_kept(target.iter().map(|(path, entry)| (path.as_str(), Some(entry))))?;

        let tracked = self
            .index
            .entries()
            .map(|entry| entry.path.clone())
            .collect::<BTreeSet<_>>();
        for path in tracked.iter().filter(|path| !target.contains_key(*path)) {
            if self.workspace.exists(path) && !self.workspace_has_directory(path) {
                self.workspace.remove_file(path)?;
            }
        }

        let mut written = Vec::new();
        for (path, entry) in &target {
            if !self.workspace_matches(path, entry)? {
                let blob = self.database.load_blob(&entry.oid)?;
                self.workspace.write_file(path, blob.content(), entry.mode)?;
                written.push(path.clone());
            }
        }

        self.index.read_tree(&self.database, &tree_oid)?;
        for path in target.keys() {
            let stat = self.workspace.stat_file(path)?;
            self.index.update_entry_stat(path, stat);
        }
        self.index.write()?;

        debug!(tree = %tree_oid, rewritten = written.len(), "checked out tree");
        Ok(())
    }

    /// No staged, unstaged or conflicted change to tracked files
    pub fn is_clean(&self) -> Result<bool> {
        if self.index.has_conflicts() {
            return Ok(false);
        }

        let head = match self.head_commit()? {
            Some(oid) => self.database.flatten_tree(&self.database.peel_to_tree(&oid)?)?,
            None => BTreeMap::new(),
        };
        let staged = self
            .index
            .entries()
            .map(|entry| (entry.path.clone(), DatabaseEntry::from(entry)))
            .collect::<BTreeMap<_, _>>();
        let staged_changes = TreeDiff::between(&head, &staged);
        if !staged_changes.is_empty() {
            debug!(changes = staged_changes.changes().len(), "index differs from HEAD");
            return Ok(false);
        }

        for (path, entry) in &staged {
            if !self.workspace_matches(path, entry)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Whether the working tree file at `path` already holds `entry`
    fn workspace_matches(&self, path: &str, entry: &DatabaseEntry) -> Result<bool> {
        if !self.workspace.exists(path) || self.workspace_has_directory(path) {
            return Ok(false);
        }

        let stat = self.workspace.stat_file(path)?;
        if stat.mode != entry.mode {
            return Ok(false);
        }

        if let Some(cached) = self.index.entry(path, Stage::Normal)
            && cached.oid == entry.oid
            && cached.stat_match(&stat)
            && cached.times_match(&stat)
        {
            return Ok(true);
        }

        let content = self.workspace.read_file(path)?;
        Ok(hash_object(self.algorithm(), ObjectType::Blob, &content) == entry.oid)
    }

    /// Fail when checking out `oid` would overwrite or delete untracked files
    pub(crate) fn ensure_checkout_keeps_untracked(&self, oid: &ObjectId) -> Result<()> {
        let target = self.database.flatten_tree(&self.database.peel_to_tree(oid)?)?;
        self.ensure_untracked_kept(target.iter().map(|(path, entry)| (path.as_str(), Some(entry))))
    }

    /// Fail when applying `result` would overwrite or delete untracked files
    pub(crate) fn ensure_merge_keeps_untracked(&self, result: &TreeMergeResult) -> Result<()> {
        let entries = result
            .entries
            .iter()
            .map(|(path, entry)| (path.as_str(), Some(entry)));
        let conflicts = result.conflicts.keys().map(|path| (path.as_str(), None));

        self.ensure_untracked_kept(entries.chain(conflicts))
    }

    /// `None` targets are written with content only known later, so any
    /// untracked file there is in the way.
    fn ensure_untracked_kept<'t>(
        &self,
        targets: impl IntoIterator<Item = (&'t str, Option<&'t DatabaseEntry>)>,
    ) -> Result<()> {
        let mut overwritten = Vec::new();
        for (path, entry) in targets {
            if self.untracked_in_the_way(path, entry)? {
                overwritten.push(path.to_string());
            }
        }

        if overwritten.is_empty() {
            return Ok(());
        }
        warn!(paths = ?overwritten, "untracked files in the way");
        Err(Error::InvalidState(format!(
            "untracked working tree files would be overwritten: {}",
            overwritten.join(", ")
        )))
    }

    fn untracked_in_the_way(&self, path: &str, entry: Option<&DatabaseEntry>) -> Result<bool> {
        if self.index.is_tracked(path) {
            return Ok(false);
        }

        if self.workspace.exists(path) {
            if self.workspace_has_directory(path) {
                return Ok(true);
            }
            return match entry {
                Some(entry) => Ok(!self.workspace_matches(path, entry)?),
                None => Ok(true),
            };
        }

        let blocked = Path::new(path)
            .ancestors()
            .skip(1)
            .filter_map(Path::to_str)
            .filter(|parent| !parent.is_empty())
            .any(|parent| {
                self.workspace.exists(parent)
                    && !self.workspace_has_directory(parent)
                    && !self.index.is_tracked(parent)
            });
        Ok(blocked)
    }

    fn workspace_has_directory(&self, path: &str) -> bool {
        self.workspace.path().join(path).is_dir()
    }

    /// Replace index and working tree contents with a tree merge
    ///
    /// Resolved paths are staged at stage 0, conflicts at stages 1-3 with
    /// their working tree content written out.
    pub fn apply_merge(&mut self, result: &TreeMergeResult) -> Result<()> {
        self.ensure_merge_keeps_untracked(result)?;

        let tracked = self
            .index
            .entries()
            .map(|entry| entry.path.clone())
            .collect::<BTreeSet<_>>();
        let stale = tracked
            .iter()
            .filter(|path| !result.entries.contains_key(*path) && !result.conflicts.contains_key(*path));
        for path in stale {
            if self.workspace.exists(path) && !self.workspace_has_directory(path) {
                self.workspace.remove_file(path)?;
            }
        }

        for (path, entry) in &result.entries {
            if !self.workspace_matches(path, entry)? {
                let blob = self.database.load_blob(&entry.oid)?;
                self.workspace.write_file(path, blob.content(), entry.mode)?;
            }
        }
        for (path, conflict) in &result.conflicts {
            match &conflict.worktree {
                Some((content, mode)) => self.workspace.write_file(path, content, *mode)?,
                None if self.workspace.exists(path) && !self.workspace_has_directory(path) => {
                    self.workspace.remove_file(path)?
                }
                None => {}
            }
        }

        self.index.clear();
        for (path, entry) in &result.entries {
            self.stage_entry(path, entry.clone())?;
        }
        for (path, conflict) in &result.conflicts {
            self.index.add_conflict(
                path,
                conflict.ancestor.clone(),
                conflict.ours.clone(),
                conflict.theirs.clone(),
            )?;
        }

        debug!(
            entries = result.entries.len(),
            conflicts = result.conflicts.len(),
            "applied merge to index and working tree"
        );
        self.index.write()
    }

    /// Stage an entry and refresh its stat data from the working tree
    fn stage_entry(&mut self, path: &str, entry: DatabaseEntry) -> Result<()> {
        let metadata = match self.workspace.stat_file(path) {
            Ok(stat) if stat.mode == entry.mode => stat,
            _ => EntryMetadata::with_mode(entry.mode),
        };

        self.index
            .add_entry(IndexEntry::new(path.to_string(), entry.oid, metadata))
    }

    pub(crate) fn rebase_path(&self) -> PathBuf {
        self.git_path.join("rebase-merge")
    }
}
