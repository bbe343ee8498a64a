//! Working tree access
//!
//! Everything that touches user files goes through [`WorkingTree`], so the index,
//! checkout and rebase logic run the same against a directory on disk or an
//! in-memory tree. Paths are relative to the tree root and `/`-separated.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::errors::{Error, Result};
use bytes::Bytes;
use is_executable::IsExecutable;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 3] = [".git", ".", ".."];

pub trait WorkingTree: std::fmt::Debug {
    /// File content, or the link target of a symlink
    fn read_file(&self, path: &str) -> Result<Bytes>;

    /// Create or replace a file, creating parent directories as needed
    fn write_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> Result<()>;

    /// Delete a file and any parent directories it leaves empty
    fn remove_file(&mut self, path: &str) -> Result<()>;

    /// Names directly inside a directory (`None` for the root), sorted
    fn list_directory(&self, path: Option<&str>) -> Result<Vec<String>>;

    /// Every file below the root, sorted
    fn list_files(&self) -> Result<Vec<String>>;

    fn stat_file(&self, path: &str) -> Result<EntryMetadata>;

    fn exists(&self, path: &str) -> bool;
}

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Workspace {
            path: path.into().into_boxed_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_ignored(path: &Path) -> bool {
        path.components().any(|component| {
            if let std::path::Component::Normal(name) = component {
                IGNORED_PATHS.contains(&name.to_string_lossy().as_ref())
            } else {
                false
            }
        })
    }

    fn relative_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(self.path.as_ref()).ok()?;
        if relative.as_os_str().is_empty() || Self::is_ignored(relative) {
            return None;
        }

        let names = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(names.join("/"))
    }

    /// Remove files sitting where `path` needs a directory
    fn clear_parents(&self, path: &str) -> Result<()> {
        let mut current = self.path.to_path_buf();

        for name in path.split('/').collect::<Vec<_>>().split_last().map_or(&[][..], |(_, dirs)| dirs) {
            current.push(name);
            if let Ok(metadata) = std::fs::symlink_metadata(&current)
                && !metadata.is_dir()
            {
                std::fs::remove_file(&current)?;
            }
        }

        Ok(())
    }

    fn prune_empty_parents(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && parent != self.path.as_ref()
            && parent.starts_with(self.path.as_ref())
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent)?;
            self.prune_empty_parents(parent)?;
        }

        Ok(())
    }

    #[cfg(unix)]
    fn set_mode(path: &Path, mode: EntryMode) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let permissions = match mode {
            EntryMode::EXECUTABLE => 0o755,
            _ => 0o644,
        };
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(permissions))?;

        Ok(())
    }

    #[cfg(not(unix))]
    fn set_mode(_path: &Path, _mode: EntryMode) -> Result<()> {
        Ok(())
    }
}

impl WorkingTree for Workspace {
    fn read_file(&self, path: &str) -> Result<Bytes> {
        let file_path = self.path.join(path);

        if std::fs::symlink_metadata(&file_path)?.file_type().is_symlink() {
            let target = std::fs::read_link(&file_path)?;
            return Ok(Bytes::from(target.to_string_lossy().into_owned()));
        }

        Ok(Bytes::from(std::fs::read(file_path)?))
    }

    fn write_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> Result<()> {
        if !mode.is_blob() {
            return Err(Error::InvalidArgument(format!(
                "cannot write '{path}' with mode {mode}"
            )));
        }

        let file_path = self.path.join(path);
        self.clear_parents(path)?;
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match std::fs::symlink_metadata(&file_path) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(&file_path)?,
            Ok(_) => std::fs::remove_file(&file_path)?,
            Err(_) => {}
        }

        match mode {
            #[cfg(unix)]
            EntryMode::Symlink => {
                let target = String::from_utf8_lossy(content).into_owned();
                std::os::unix::fs::symlink(target, &file_path)?;
            }
            _ => {
                std::fs::write(&file_path, content)?;
                Self::set_mode(&file_path, mode)?;
            }
        }

        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        let file_path = self.path.join(path);

        std::fs::remove_file(&file_path)?;
        self.prune_empty_parents(&file_path)
    }

    fn list_directory(&self, path: Option<&str>) -> Result<Vec<String>> {
        let dir_path = match path {
            Some(path) => self.path.join(path),
            None => self.path.to_path_buf(),
        };

        let mut names = std::fs::read_dir(&dir_path)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                (!IGNORED_PATHS.contains(&name.as_str())).then_some(name)
            })
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.path)
            .into_iter()
            .filter_entry(|entry| !IGNORED_PATHS.contains(&entry.file_name().to_string_lossy().as_ref()))
        {
            let entry = entry.map_err(|err| {
                err.into_io_error()
                    .map(Error::Io)
                    .unwrap_or_else(|| Error::InvalidState("file system loop detected".to_string()))
            })?;

            if !entry.file_type().is_dir()
                && let Some(name) = self.relative_name(entry.path())
            {
                files.push(name);
            }
        }
        files.sort();

        Ok(files)
    }

    fn stat_file(&self, path: &str) -> Result<EntryMetadata> {
        let file_path = self.path.join(path);
        let metadata = std::fs::symlink_metadata(&file_path)?;

        Ok(EntryMetadata::from_fs(
            &metadata,
            metadata.is_file() && file_path.is_executable(),
        ))
    }

    fn exists(&self, path: &str) -> bool {
        std::fs::symlink_metadata(self.path.join(path)).is_ok()
    }
}

/// Working tree held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryWorkspace {
    files: BTreeMap<String, (Bytes, EntryMode)>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        MemoryWorkspace {
            files: files
                .into_iter()
                .map(|(path, content)| {
                    (
                        path.to_string(),
                        (Bytes::copy_from_slice(content.as_bytes()), EntryMode::REGULAR),
                    )
                })
                .collect(),
        }
    }

    fn missing(path: &str) -> Error {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no such file '{path}'"),
        ))
    }
}

impl WorkingTree for MemoryWorkspace {
    fn read_file(&self, path: &str) -> Result<Bytes> {
        self.files
            .get(path)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| Self::missing(path))
    }

    fn write_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> Result<()> {
        if !mode.is_blob() {
            return Err(Error::InvalidArgument(format!(
                "cannot write '{path}' with mode {mode}"
            )));
        }

        // a file replaces anything below it, and any file above it
        let prefix = format!("{path}/");
        self.files.retain(|existing, _| {
            !existing.starts_with(&prefix) && !path.starts_with(&format!("{existing}/"))
        });
        self.files
            .insert(path.to_string(), (Bytes::copy_from_slice(content), mode));

        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::missing(path))
    }

    fn list_directory(&self, path: Option<&str>) -> Result<Vec<String>> {
        let prefix = path.map(|path| format!("{path}/")).unwrap_or_default();

        let names = self
            .files
            .keys()
            .filter_map(|file| file.strip_prefix(&prefix))
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect::<BTreeSet<_>>();

        if names.is_empty() && path.is_some() {
            return Err(Self::missing(&prefix));
        }

        Ok(names.into_iter().collect())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn stat_file(&self, path: &str) -> Result<EntryMetadata> {
        let (content, mode) = self.files.get(path).ok_or_else(|| Self::missing(path))?;

        Ok(EntryMetadata {
            size: content.len() as u64,
            ..EntryMetadata::with_mode(*mode)
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}
