//! Object identifier (raw digest)
//!
//! Object ids are the raw bytes of a SHA-1 (20 bytes) or SHA-256 (32 bytes) digest.
//! Equality is byte-exact; the textual form is lowercase hexadecimal.
//!
//! ## Storage
//!
//! Loose objects live at `objects/<first-2-hex-chars>/<remaining-hex-chars>`

use crate::artifacts::objects::hash::HashAlgorithm;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::io;
use std::path::PathBuf;

/// Length of the abbreviated form used in messages
const SHORT_OID_LENGTH: usize = 7;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Bytes);

impl ObjectId {
    pub(crate) fn from_digest(digest: Vec<u8>) -> Self {
        Self(Bytes::from(digest))
    }

    /// Build an id from raw digest bytes (20 or 32 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if HashAlgorithm::from_digest_len(bytes.len()).is_none() {
            return Err(Error::InvalidArgument(format!(
                "invalid object id length: {} bytes",
                bytes.len()
            )));
        }

        Ok(Self(Bytes::copy_from_slice(bytes)))
    }

    /// Parse and validate an object id from its full hexadecimal form
    pub fn try_parse(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        let bytes = hex::decode(id)
            .map_err(|_| Error::InvalidArgument(format!("invalid object id: {id}")))?;

        Self::from_bytes(&bytes)
    }

    /// Parse a hexadecimal id that must belong to the given algorithm
    pub fn try_parse_for(id: impl AsRef<str>, algorithm: HashAlgorithm) -> Result<Self> {
        let id = id.as_ref();
        if id.len() != algorithm.hex_len() {
            return Err(Error::malformed(format!(
                "expected a {algorithm} object id, got '{id}'"
            )));
        }

        Self::try_parse(id).map_err(|_| Error::malformed(format!("invalid object id '{id}'")))
    }

    /// The all-zero id of an algorithm
    pub fn null(algorithm: HashAlgorithm) -> Self {
        Self(Bytes::from(vec![0; algorithm.digest_len()]))
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::from_digest_len(self.0.len()).unwrap_or_default()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Write the raw digest bytes, as embedded in trees and index entries
    pub fn write_raw_to<W: io::Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }

    /// Read a raw digest of the algorithm's length
    pub fn read_raw_from<R: io::Read + ?Sized>(
        reader: &mut R,
        algorithm: HashAlgorithm,
    ) -> io::Result<Self> {
        let mut buffer = vec![0; algorithm.digest_len()];
        reader.read_exact(&mut buffer)?;

        Ok(Self(Bytes::from(buffer)))
    }

    /// Convert to file system path for loose object storage
    ///
    /// For example, `abc123...` becomes `ab/c123...`
    pub fn to_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    pub fn to_short_oid(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_OID_LENGTH);
        hex
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn loose_path_splits_first_byte() {
        let oid = ObjectId::try_parse("abcdef0123456789abcdef0123456789abcdef01").unwrap();

        assert_eq!(
            oid.to_path(),
            PathBuf::from("ab").join("cdef0123456789abcdef0123456789abcdef01")
        );
        assert_eq!(oid.to_short_oid(), "abcdef0");
        assert_eq!(oid.algorithm(), HashAlgorithm::Sha1);
    }

    #[rstest]
    #[case("abc")]
    #[case("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz")]
    #[case("abcdef0123456789abcdef0123456789abcdef0")]
    fn rejects_invalid_hex(#[case] input: &str) {
        assert!(ObjectId::try_parse(input).is_err());
    }

    #[rstest]
    fn parse_for_algorithm_checks_length() {
        let sha1 = "abcdef0123456789abcdef0123456789abcdef01";

        assert!(ObjectId::try_parse_for(sha1, HashAlgorithm::Sha1).is_ok());
        assert!(matches!(
            ObjectId::try_parse_for(sha1, HashAlgorithm::Sha256),
            Err(Error::Malformed(_))
        ));
    }

    proptest! {
        #[test]
        fn hex_form_parses_back(bytes in proptest::collection::vec(any::<u8>(), 32)) {
            let oid = ObjectId::from_bytes(&bytes).unwrap();
            prop_assert_eq!(ObjectId::try_parse(oid.to_hex()).unwrap(), oid);
        }
    }
}
