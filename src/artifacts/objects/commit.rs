//! Commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history)
//! - Author and committer signatures
//! - Extra headers such as `encoding` or `gpgsig`, kept verbatim and in order
//! - The message bytes
//!
//! ## Format
//!
//! ```text
//! commit <size>\0
//! tree <tree-oid>
//! parent <parent-oid>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//! gpgsig -----BEGIN PGP SIGNATURE-----
//!  <continuation lines start with a space>
//!
//! <commit message>
//! ```

use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use bytes::Bytes;

const ENCODING_HEADER: &str = "encoding";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Tree object ID representing the directory snapshot
    tree_oid: ObjectId,
    /// Empty for a root commit, several for a merge commit
    parents: Vec<ObjectId>,
    author: Signature,
    committer: Signature,
    /// Headers following `committer`, in encoded order
    extra_headers: Vec<(String, Bytes)>,
    message: Bytes,
}

impl Commit {
    pub fn new(
        tree_oid: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: impl Into<Bytes>,
    ) -> Self {
        Commit {
            tree_oid,
            parents,
            author,
            committer,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    /// Set the `encoding` header, replacing a previous value
    pub fn with_encoding(self, encoding: impl Into<String>) -> Result<Self> {
        self.with_extra_header(ENCODING_HEADER, encoding.into())
    }

    /// Append a header after `committer`, or replace an existing header of the same name
    pub fn with_extra_header(mut self, name: &str, value: impl Into<Bytes>) -> Result<Self> {
        if name.is_empty() || name.contains([' ', '\n', '\0']) {
            return Err(Error::InvalidArgument(format!(
                "invalid commit header name '{}'",
                name.escape_debug()
            )));
        }
        if matches!(name, "tree" | "parent" | "author" | "committer") {
            return Err(Error::InvalidArgument(format!(
                "'{name}' is not an extra commit header"
            )));
        }

        let value = value.into();
        match self.extra_headers.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.extra_headers.push((name.to_string(), value)),
        }

        Ok(self)
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    pub fn message(&self) -> &Bytes {
        &self.message
    }

    /// First line of the message, lossily decoded
    pub fn short_message(&self) -> String {
        let first_line = self.message.split(|byte| *byte == b'\n').next().unwrap_or(&[]);
        String::from_utf8_lossy(first_line).into_owned()
    }

    pub fn extra_headers(&self) -> &[(String, Bytes)] {
        &self.extra_headers
    }

    pub fn header(&self, name: &str) -> Option<&Bytes> {
        self.extra_headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Value of the `encoding` header, when present
    pub fn encoding(&self) -> Option<String> {
        self.header(ENCODING_HEADER)
            .map(|value| String::from_utf8_lossy(value).into_owned())
    }
}

impl Packable for Commit {
    fn serialize(&self) -> Result<Bytes> {
        let mut content = Vec::new();

        content.extend_from_slice(format!("tree {}\n", self.tree_oid).as_bytes());
        for parent in &self.parents {
            content.extend_from_slice(format!("parent {parent}\n").as_bytes());
        }
        content.extend_from_slice(format!("author {}\n", self.author.display()).as_bytes());
        content.extend_from_slice(format!("committer {}\n", self.committer.display()).as_bytes());

        for (name, value) in &self.extra_headers {
            content.extend_from_slice(name.as_bytes());
            content.push(b' ');
            for (i, line) in value.split(|byte| *byte == b'\n').enumerate() {
                if i > 0 {
                    content.extend_from_slice(b"\n ");
                }
                content.extend_from_slice(line);
            }
            content.push(b'\n');
        }

        content.push(b'\n');
        content.extend_from_slice(&self.message);

        Ok(Bytes::from(content))
    }
}

/// Split `<headers>\n\n<message>` and unfold continuation lines
///
/// Shared with tags, which use the same header syntax.
pub(crate) fn parse_headers(data: &Bytes) -> Result<(Vec<(String, Vec<u8>)>, Bytes)> {
    let separator = data
        .windows(2)
        .position(|window| window == b"\n\n")
        .ok_or_else(|| Error::malformed("missing blank line before message"))?;
    let message = data.slice(separator + 2..);

    let mut headers: Vec<(String, Vec<u8>)> = Vec::new();
    for line in data[..separator].split(|byte| *byte == b'\n') {
        if let Some(continuation) = line.strip_prefix(b" ") {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| Error::malformed("continuation line without a header"))?;
            value.push(b'\n');
            value.extend_from_slice(continuation);
            continue;
        }

        let space = line
            .iter()
            .position(|byte| *byte == b' ')
            .ok_or_else(|| Error::malformed("header line has no value"))?;
        let name = std::str::from_utf8(&line[..space])
            .ok()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::malformed("invalid header name"))?;

        headers.push((name.to_string(), line[space + 1..].to_vec()));
    }

    Ok((headers, message))
}

pub(crate) fn header_str<'h>(name: &str, value: &'h [u8]) -> Result<&'h str> {
    std::str::from_utf8(value)
        .ok()
        .filter(|value| !value.contains('\n'))
        .ok_or_else(|| Error::malformed(format!("invalid '{name}' header")))
}

/// Take the next header, which must be named `expected`
pub(crate) fn expect_header(
    headers: &mut impl Iterator<Item = (String, Vec<u8>)>,
    object: &str,
    expected: &str,
) -> Result<Vec<u8>> {
    match headers.next() {
        Some((name, value)) if name == expected => Ok(value),
        _ => Err(Error::malformed(format!(
            "{object} is missing a '{expected}' header"
        ))),
    }
}

impl Unpackable for Commit {
    fn deserialize(data: Bytes, algorithm: HashAlgorithm) -> Result<Self> {
        let (headers, message) = parse_headers(&data)?;
        let mut headers = headers.into_iter().peekable();

        let tree_oid = expect_header(&mut headers, "commit", "tree")?;
        let tree_oid = ObjectId::try_parse_for(header_str("tree", &tree_oid)?, algorithm)?;

        let mut parents = Vec::new();
        while headers.peek().is_some_and(|(name, _)| name == "parent") {
            if let Some((_, parent)) = headers.next() {
                parents.push(ObjectId::try_parse_for(
                    header_str("parent", &parent)?,
                    algorithm,
                )?);
            }
        }

        let author = expect_header(&mut headers, "commit", "author")?;
        let author = Signature::try_from(header_str("author", &author)?)?;
        let committer = expect_header(&mut headers, "commit", "committer")?;
        let committer = Signature::try_from(header_str("committer", &committer)?)?;

        let mut extra_headers = Vec::new();
        for (name, value) in headers {
            if matches!(name.as_str(), "tree" | "parent" | "author" | "committer") {
                return Err(Error::malformed(format!("unexpected '{name}' header")));
            }
            extra_headers.push((name, Bytes::from(value)));
        }

        Ok(Commit {
            tree_oid,
            parents,
            author,
            committer,
            extra_headers,
            message,
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }
}
