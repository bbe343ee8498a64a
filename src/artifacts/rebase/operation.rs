use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Pick,
    /// Pick, then let the caller supply a new message on commit
    Reword,
    /// Pick, then stop so the caller can amend the result
    Edit,
    /// Fold into the previous commit, joining both messages
    Squash,
    /// Fold into the previous commit, keeping its message
    Fixup,
    /// Run a command; the engine only reports it
    Exec,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Pick => "pick",
            OperationKind::Reword => "reword",
            OperationKind::Edit => "edit",
            OperationKind::Squash => "squash",
            OperationKind::Fixup => "fixup",
            OperationKind::Exec => "exec",
        }
    }

    pub fn folds_into_previous(&self) -> bool {
        matches!(self, OperationKind::Squash | OperationKind::Fixup)
    }
}

impl TryFrom<&str> for OperationKind {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "pick" | "p" => Ok(OperationKind::Pick),
            "reword" | "r" => Ok(OperationKind::Reword),
            "edit" | "e" => Ok(OperationKind::Edit),
            "squash" | "s" => Ok(OperationKind::Squash),
            "fixup" | "f" => Ok(OperationKind::Fixup),
            "exec" | "x" => Ok(OperationKind::Exec),
            _ => Err(Error::malformed(format!("unknown rebase operation '{value}'"))),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a rebase plan
///
/// Every kind but `exec` names the commit it replays; `exec` carries a command
/// line instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseOperation {
    kind: OperationKind,
    id: Option<ObjectId>,
    exec: Option<String>,
}

impl RebaseOperation {
    pub fn pick(id: ObjectId) -> Self {
        Self::with_kind(OperationKind::Pick, id)
    }

    /// `Exec` steps are built with [`RebaseOperation::exec`] instead
    pub fn try_new(kind: OperationKind, id: ObjectId) -> Result<Self> {
        if kind == OperationKind::Exec {
            return Err(Error::InvalidArgument(
                "exec operations take a command, not a commit".to_string(),
            ));
        }

        Ok(Self::with_kind(kind, id))
    }

    pub fn exec(command: impl Into<String>) -> Self {
        RebaseOperation {
            kind: OperationKind::Exec,
            id: None,
            exec: Some(command.into()),
        }
    }

    fn with_kind(kind: OperationKind, id: ObjectId) -> Self {
        RebaseOperation {
            kind,
            id: Some(id),
            exec: None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Change what happens to the commit, keeping the commit itself
    pub fn set_kind(&mut self, kind: OperationKind) -> Result<()> {
        if (kind == OperationKind::Exec) != (self.kind == OperationKind::Exec) {
            return Err(Error::InvalidArgument(format!(
                "cannot turn {} into {kind}",
                self.kind
            )));
        }

        self.kind = kind;
        Ok(())
    }

    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    pub fn exec_command(&self) -> Option<&str> {
        self.exec.as_deref()
    }

    /// Parse one line of a todo list: `<kind> <oid>` or `exec <command>`
    pub fn parse_line(line: &str) -> Result<Self> {
        let (kind, rest) = line
            .split_once(' ')
            .ok_or_else(|| Error::malformed(format!("invalid todo line '{line}'")))?;
        let kind = OperationKind::try_from(kind)?;

        if kind == OperationKind::Exec {
            return Ok(Self::exec(rest));
        }

        let id = rest.split_whitespace().next().unwrap_or_default();
        Ok(Self::with_kind(kind, ObjectId::try_parse(id)?))
    }
}

impl fmt::Display for RebaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.exec) {
            (Some(id), _) => write!(f, "{} {id}", self.kind),
            (None, Some(command)) => write!(f, "{} {command}", self.kind),
            (None, None) => f.write_str(self.kind.as_str()),
        }
    }
}
