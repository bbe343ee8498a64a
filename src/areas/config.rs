//! Repository configuration
//!
//! [`RepositoryOptions`] choose how a repository is created. They are persisted
//! to `.git/config` in the usual INI layout, and read back on open:
//!
//! ```text
//! [core]
//!     repositoryformatversion = 1
//!     bare = false
//!     compression = 6
//! [extensions]
//!     objectformat = sha256
//! ```

use crate::artifacts::objects::hash::HashAlgorithm;
use crate::errors::{Error, Result};
use derive_new::new;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMPRESSION: u32 = 6;

/// Environment variable selecting the hash algorithm of new repositories
pub const OBJECT_FORMAT_ENV: &str = "BIT_OBJECT_FORMAT";
/// Environment variable naming the initial branch of new repositories
pub const DEFAULT_BRANCH_ENV: &str = "BIT_DEFAULT_BRANCH";

const SECTION_REGEX: &str = r"^\[([A-Za-z0-9.-]+)\]$";
const KEY_VALUE_REGEX: &str = r"^([A-Za-z][A-Za-z0-9-]*)\s*=\s*(.*)$";

static CONFIG_LINE: LazyLock<std::result::Result<(regex::Regex, regex::Regex), regex::Error>> =
    LazyLock::new(|| Ok((regex::Regex::new(SECTION_REGEX)?, regex::Regex::new(KEY_VALUE_REGEX)?)));

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RepositoryOptions {
    #[new(value = "HashAlgorithm::Sha1")]
    pub algorithm: HashAlgorithm,
    #[new(value = "DEFAULT_BRANCH.to_string()")]
    pub default_branch: String,
    /// zlib level for loose objects, 0-9
    #[new(value = "DEFAULT_COMPRESSION")]
    pub compression: u32,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryOptions {
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_default_branch(mut self, name: impl Into<String>) -> Self {
        self.default_branch = name.into();
        self
    }

    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = level.min(9);
        self
    }

    /// Apply `BIT_OBJECT_FORMAT` and `BIT_DEFAULT_BRANCH` when set
    pub fn from_env(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(format) = lookup(OBJECT_FORMAT_ENV) {
            self.algorithm = HashAlgorithm::try_from(format.as_str())?;
        }
        if let Some(branch) = lookup(DEFAULT_BRANCH_ENV).filter(|branch| !branch.is_empty()) {
            self.default_branch = branch;
        }

        Ok(self)
    }

    pub fn flate_compression(&self) -> flate2::Compression {
        flate2::Compression::new(self.compression)
    }
}

/// Parsed `.git/config`: section name to key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigFile {
    pub fn from_options(options: &RepositoryOptions) -> Self {
        let mut config = ConfigFile::default();
        config.set("core", "repositoryformatversion", "1");
        config.set("core", "bare", "false");
        config.set("core", "compression", &options.compression.to_string());
        config.set("extensions", "objectformat", options.algorithm.as_str());
        config
    }

    pub fn parse(content: &str) -> Result<Self> {
        let (section_re, key_value_re) = CONFIG_LINE
            .as_ref()
            .map_err(|err| Error::Regex(err.clone()))?;

        let mut config = ConfigFile::default();
        let mut section = None;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(captures) = section_re.captures(line) {
                section = Some(captures[1].to_ascii_lowercase());
            } else if let Some(captures) = key_value_re.captures(line)
                && let Some(section) = &section
            {
                config.set(section, &captures[1].to_ascii_lowercase(), captures[2].trim());
            } else {
                return Err(Error::malformed(format!(
                    "invalid config line {}: '{line}'",
                    number + 1
                )));
            }
        }

        Ok(config)
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Hash algorithm named by `extensions.objectformat`, SHA-1 when absent
    pub fn algorithm(&self) -> Result<HashAlgorithm> {
        match self.get("extensions", "objectformat") {
            Some(format) => HashAlgorithm::try_from(format),
            None => Ok(HashAlgorithm::Sha1),
        }
    }

    pub fn compression(&self) -> Result<u32> {
        match self.get("core", "compression") {
            Some(level) => level
                .parse::<i32>()
                .map(|level| level.clamp(0, 9) as u32)
                .map_err(|_| Error::malformed(format!("invalid core.compression '{level}'"))),
            None => Ok(DEFAULT_COMPRESSION),
        }
    }
}

impl std::fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (section, values) in &self.sections {
            writeln!(f, "[{section}]")?;
            for (key, value) in values {
                writeln!(f, "\t{key} = {value}")?;
            }
        }

        Ok(())
    }
}
