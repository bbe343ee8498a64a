//! References (HEAD and branches)
//!
//! A reference file holds either a full object id or `ref: <name>` pointing at
//! another reference. `HEAD` is symbolic while a branch is checked out, and
//! holds an id when detached.

use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use derive_new::new;
use file_guard::Lock;
use std::io::Write;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

const SYMREF_REGEX: &str = r"^ref: (.+)$";

static SYMREF: LazyLock<std::result::Result<regex::Regex, regex::Error>> =
    LazyLock::new(|| regex::Regex::new(SYMREF_REGEX));

/// Symbolic chains longer than this are treated as loops
const MAX_SYMREF_DEPTH: usize = 5;

/// What `HEAD` currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// A branch is checked out
    Symbolic(SymRefName),
    Detached(ObjectId),
}

#[derive(Debug, Clone)]
enum SymRefOrOid {
    SymRef { sym_ref_name: SymRefName },
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read(path: &Path) -> Result<Option<SymRefOrOid>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref = SYMREF.as_ref().map_err(|err| Error::Regex(err.clone()))?;
        match symref.captures(content) {
            Some(symref_match) => Ok(Some(SymRefOrOid::SymRef {
                sym_ref_name: SymRefName::new(symref_match[1].to_string()),
            })),
            None => Ok(Some(SymRefOrOid::Oid(ObjectId::try_parse(content).map_err(
                |_| Error::malformed(format!("invalid reference {}", path.display())),
            )?))),
        }
    }
}

#[derive(Debug, Clone, new)]
pub struct Refs {
    /// The git directory
    path: Box<Path>,
}

impl Refs {
    pub fn head(&self) -> Result<Head> {
        match SymRefOrOid::read(&self.head_path())? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) => Ok(Head::Symbolic(sym_ref_name)),
            Some(SymRefOrOid::Oid(oid)) => Ok(Head::Detached(oid)),
            None => Err(Error::NotFound("HEAD".to_string())),
        }
    }

    /// Commit `HEAD` resolves to, `None` on an unborn branch
    pub fn read_head(&self) -> Result<Option<ObjectId>> {
        self.resolve(&SymRefName::head())
    }

    /// Last reference in the chain starting at `HEAD`
    pub fn current_ref(&self) -> Result<SymRefName> {
        let mut current = SymRefName::head();

        for _ in 0..MAX_SYMREF_DEPTH {
            match SymRefOrOid::read(&self.ref_path(&current))? {
                Some(SymRefOrOid::SymRef { sym_ref_name }) => current = sym_ref_name,
                Some(SymRefOrOid::Oid(_)) | None => return Ok(current),
            }
        }

        Err(Error::InvalidState(format!("symbolic reference loop at {current}")))
    }

    /// Branch checked out, `None` when `HEAD` is detached
    pub fn current_branch(&self) -> Result<Option<BranchName>> {
        let current = self.current_ref()?;

        if current.is_head() {
            Ok(None)
        } else {
            BranchName::try_parse_sym_ref_name(&current).map(Some)
        }
    }

    pub fn read_branch(&self, name: &BranchName) -> Result<Option<ObjectId>> {
        self.resolve(&name.to_sym_ref_name())
    }

    pub fn update_branch(&self, name: &BranchName, oid: &ObjectId) -> Result<()> {
        debug!(branch = %name, %oid, "updating branch");
        self.write_ref_file(&self.ref_path(&name.to_sym_ref_name()), &format!("{oid}\n"))
    }

    pub fn create_branch(&self, name: &BranchName, oid: &ObjectId) -> Result<()> {
        if self.ref_path(&name.to_sym_ref_name()).exists() {
            return Err(Error::InvalidArgument(format!("branch {name} already exists")));
        }

        self.update_branch(name, oid)
    }

    pub fn set_head_symbolic(&self, name: &BranchName) -> Result<()> {
        debug!(branch = %name, "attaching HEAD");
        self.write_ref_file(
            &self.head_path(),
            &format!("ref: {}\n", name.to_sym_ref_name()),
        )
    }

    pub fn set_head_detached(&self, oid: &ObjectId) -> Result<()> {
        debug!(%oid, "detaching HEAD");
        self.write_ref_file(&self.head_path(), &format!("{oid}\n"))
    }

    /// Move whatever `HEAD` points at to `oid`
    pub fn update_head(&self, oid: &ObjectId) -> Result<()> {
        let target = self.current_ref()?;
        self.write_ref_file(&self.ref_path(&target), &format!("{oid}\n"))
    }

    fn resolve(&self, name: &SymRefName) -> Result<Option<ObjectId>> {
        let mut current = name.clone();

        for _ in 0..MAX_SYMREF_DEPTH {
            match SymRefOrOid::read(&self.ref_path(&current))? {
                Some(SymRefOrOid::SymRef { sym_ref_name }) => current = sym_ref_name,
                Some(SymRefOrOid::Oid(oid)) => return Ok(Some(oid)),
                None => return Ok(None),
            }
        }

        Err(Error::InvalidState(format!("symbolic reference loop at {name}")))
    }

    fn write_ref_file(&self, path: &Path, raw_ref: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)?;
        lock.set_len(0)?;
        lock.deref_mut().write_all(raw_ref.as_bytes())?;

        Ok(())
    }

    fn ref_path(&self, name: &SymRefName) -> PathBuf {
        self.path.join(name.as_ref_path())
    }

    pub fn head_path(&self) -> PathBuf {
        self.path.join("HEAD")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.path.join("refs").join("heads")
    }
}
