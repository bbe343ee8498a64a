use crate::artifacts::branch::INVALID_BRANCH_NAME_REGEX;
use crate::errors::{Error, Result};
use derive_new::new;
use std::sync::LazyLock;

const REF_PREFIX: &str = "refs/heads/";

static INVALID_BRANCH_NAME: LazyLock<std::result::Result<regex::Regex, regex::Error>> =
    LazyLock::new(|| regex::Regex::new(INVALID_BRANCH_NAME_REGEX));

/// Full name of a reference below the git directory, e.g. `refs/heads/main`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, new)]
pub struct SymRefName(String);

impl SymRefName {
    pub fn head() -> Self {
        SymRefName("HEAD".to_string())
    }

    pub fn is_head(&self) -> bool {
        self.0 == "HEAD"
    }

    pub fn as_ref_path(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SymRefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument("branch name cannot be empty".to_string()));
        }

        let invalid = INVALID_BRANCH_NAME
            .as_ref()
            .map_err(|err| Error::Regex(err.clone()))?;

        if name == "HEAD" || invalid.is_match(&name) {
            Err(Error::InvalidArgument(format!(
                "invalid branch name '{}'",
                name.escape_debug()
            )))
        } else {
            Ok(Self(name))
        }
    }

    /// Branch named by a `refs/heads/...` reference
    pub fn try_parse_sym_ref_name(sym_ref_name: &SymRefName) -> Result<Self> {
        match sym_ref_name.0.strip_prefix(REF_PREFIX) {
            Some(name) => Self::try_parse(name),
            None => Err(Error::InvalidArgument(format!(
                "'{sym_ref_name}' is not a branch reference"
            ))),
        }
    }

    pub fn to_sym_ref_name(&self) -> SymRefName {
        SymRefName(format!("{REF_PREFIX}{}", self.0))
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
