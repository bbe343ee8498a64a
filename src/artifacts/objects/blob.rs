//! Blob object
//!
//! Blobs store file content: raw bytes only, without a name or mode
//! (those live in the tree entries pointing at the blob).
//!
//! On disk: `blob <size>\0<content>`

use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::Result;
use bytes::Bytes;
use derive_new::new;

/// Number of leading bytes inspected when sniffing for binary content
pub const BINARY_SNIFF_LENGTH: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    content: Bytes,
}

impl Blob {
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }

    pub fn is_binary(&self) -> bool {
        is_binary(&self.content)
    }
}

/// Content is treated as binary when a NUL byte appears near its start
pub fn is_binary(content: &[u8]) -> bool {
    content
        .iter()
        .take(BINARY_SNIFF_LENGTH)
        .any(|byte| *byte == 0)
}

impl Packable for Blob {
    fn serialize(&self) -> Result<Bytes> {
        Ok(self.content.clone())
    }
}

impl Unpackable for Blob {
    fn deserialize(data: Bytes, _algorithm: HashAlgorithm) -> Result<Self> {
        Ok(Self::new(data))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }
}

impl From<&str> for Blob {
    fn from(content: &str) -> Self {
        Self::new(Bytes::copy_from_slice(content.as_bytes()))
    }
}
