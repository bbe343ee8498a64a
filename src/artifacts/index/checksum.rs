//! Digest-tracking reader/writer for the index file

use crate::artifacts::objects::hash::{HashAlgorithm, Hasher};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use bytes::Bytes;
use file_guard::FileGuard;
use std::io::{Read, Write};
use std::ops::DerefMut;

#[derive(Debug)]
pub struct Checksum<'f> {
    file: FileGuard<&'f mut std::fs::File>,
    algorithm: HashAlgorithm,
    digest: Hasher,
}

impl<'f> Checksum<'f> {
    pub(crate) fn new(file: FileGuard<&'f mut std::fs::File>, algorithm: HashAlgorithm) -> Self {
        Checksum {
            file,
            algorithm,
            digest: algorithm.hasher(),
        }
    }

    pub(crate) fn read(&mut self, size: usize) -> Result<Bytes> {
        let mut buffer = vec![0; size];
        self.file
            .deref_mut()
            .read_exact(&mut buffer)
            .map_err(|_| Error::corrupt("index", "unexpected end of file"))?;

        self.digest.update(&buffer);
        Ok(Bytes::from(buffer))
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.deref_mut().write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    pub(crate) fn write_checksum(mut self) -> Result<()> {
        let checksum = self.digest.clone().finalize();
        let file = self.file.deref_mut();
        checksum.write_raw_to(file)?;
        file.flush()?;

        Ok(())
    }

    pub(crate) fn verify(mut self) -> Result<()> {
        let expected = ObjectId::read_raw_from(self.file.deref_mut(), self.algorithm)
            .map_err(|_| Error::corrupt("index", "missing checksum"))?;
        let actual = self.digest.clone().finalize();

        if expected != actual {
            return Err(Error::corrupt(
                "index",
                "checksum does not match value stored on disk",
            ));
        }

        Ok(())
    }
}
