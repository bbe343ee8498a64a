use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{Error, Result};
use bytes::Bytes;

/// Encodes an object's payload (without the `<type> <size>\0` header)
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

/// Decodes an object's payload (the header has already been stripped)
pub trait Unpackable {
    fn deserialize(data: Bytes, algorithm: HashAlgorithm) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn object_id(&self, algorithm: HashAlgorithm) -> Result<ObjectId> {
        let payload = self.serialize()?;
        Ok(hash_object(algorithm, self.object_type(), &payload))
    }
}

/// Canonical header preceding every payload: `<type> <size>\0`
pub fn object_header(object_type: ObjectType, size: usize) -> Vec<u8> {
    format!("{} {}\0", object_type.as_str(), size).into_bytes()
}

pub fn hash_object(algorithm: HashAlgorithm, object_type: ObjectType, payload: &[u8]) -> ObjectId {
    let mut hasher = algorithm.hasher();
    hasher.update(&object_header(object_type, payload.len()));
    hasher.update(payload);
    hasher.finalize()
}

/// Split a raw stored object into its type, declared size and payload offset
pub fn parse_header(raw: &[u8]) -> Result<(ObjectType, usize, usize)> {
    let space = raw
        .iter()
        .position(|byte| *byte == b' ')
        .ok_or_else(|| Error::malformed("object header has no type separator"))?;
    let nul = raw[space..]
        .iter()
        .position(|byte| *byte == 0)
        .map(|offset| space + offset)
        .ok_or_else(|| Error::malformed("object header is not NUL terminated"))?;

    let object_type = ObjectType::try_from(&raw[..space])?;
    let size = std::str::from_utf8(&raw[space + 1..nul])
        .ok()
        .filter(|size| !size.is_empty() && size.bytes().all(|byte| byte.is_ascii_digit()))
        .and_then(|size| size.parse::<usize>().ok())
        .ok_or_else(|| Error::malformed("object header has an invalid size"))?;

    Ok((object_type, size, nul + 1))
}

/// Any decoded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

impl ObjectBox {
    pub fn decode(object_type: ObjectType, data: Bytes, algorithm: HashAlgorithm) -> Result<Self> {
        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(data, algorithm)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(data, algorithm)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(
                data, algorithm,
            )?))),
            ObjectType::Tag => Ok(ObjectBox::Tag(Box::new(Tag::deserialize(data, algorithm)?))),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        match self {
            ObjectBox::Blob(blob) => blob.serialize(),
            ObjectBox::Tree(tree) => tree.serialize(),
            ObjectBox::Commit(commit) => commit.serialize(),
            ObjectBox::Tag(tag) => tag.serialize(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
            ObjectBox::Tag(_) => ObjectType::Tag,
        }
    }

    pub fn object_id(&self, algorithm: HashAlgorithm) -> Result<ObjectId> {
        Ok(hash_object(algorithm, self.object_type(), &self.encode()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn blob_id_matches_git() {
        // `printf 'hello\n' | git hash-object --stdin`
        let oid = hash_object(HashAlgorithm::Sha1, ObjectType::Blob, b"hello\n");

        assert_eq!(oid.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[rstest]
    fn header_is_parsed() {
        let (object_type, size, offset) = parse_header(b"commit 12\0payload").unwrap();

        assert_eq!(object_type, ObjectType::Commit);
        assert_eq!(size, 12);
        assert_eq!(offset, 10);
    }

    #[rstest]
    #[case(b"blob 5".as_slice())]
    #[case(b"blob\0".as_slice())]
    #[case(b"blob x\0".as_slice())]
    #[case(b"blob \0".as_slice())]
    #[case(b"chunk 1\0a".as_slice())]
    fn truncated_or_invalid_headers_are_malformed(#[case] raw: &[u8]) {
        assert!(matches!(parse_header(raw), Err(Error::Malformed(_))));
    }
}
