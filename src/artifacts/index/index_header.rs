use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IndexHeader {
    pub marker: [u8; 4],
    pub version: u32,
    pub entries_count: u32,
}

impl IndexHeader {
    pub fn with_entries(entries_count: u32) -> Self {
        IndexHeader::new(*SIGNATURE, VERSION, entries_count)
    }

    /// Reject unknown signatures and versions
    pub fn validate(&self) -> Result<()> {
        if &self.marker != SIGNATURE {
            return Err(Error::corrupt("index", "invalid index file signature"));
        }
        if self.version != VERSION {
            return Err(Error::corrupt(
                "index",
                format!("unsupported index file version {}", self.version),
            ));
        }

        Ok(())
    }
}

impl Packable for IndexHeader {
    fn serialize(&self) -> Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(&self.marker)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.version)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for IndexHeader {
    fn deserialize(bytes: Bytes, _algorithm: HashAlgorithm) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::malformed("index header is truncated"));
        }

        let mut marker = [0; 4];
        marker.copy_from_slice(&bytes[0..4]);
        let version = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        let entries_count = byteorder::NetworkEndian::read_u32(&bytes[8..12]);

        Ok(IndexHeader {
            marker,
            version,
            entries_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn header_layout_is_big_endian() {
        let bytes = IndexHeader::with_entries(3).serialize().unwrap();

        assert_eq!(bytes.as_ref(), b"DIRC\0\0\0\x02\0\0\0\x03");
        assert_eq!(
            IndexHeader::deserialize(bytes, HashAlgorithm::Sha1).unwrap(),
            IndexHeader::with_entries(3)
        );
    }

    #[rstest]
    fn unknown_versions_are_rejected() {
        assert!(IndexHeader::new(*SIGNATURE, 3, 0).validate().is_err());
        assert!(IndexHeader::new(*b"CRID", VERSION, 0).validate().is_err());
    }
}
