//! Storage backends behind the object database
//!
//! A backend maps object ids to raw, uncompressed object bytes
//! (`<type> <size>\0<payload>`). It never interprets or verifies them;
//! hashing and integrity checks belong to [`Database`](crate::areas::database::Database).

use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

pub trait ObjectBackend: Send + Sync + std::fmt::Debug {
    /// Raw object bytes, or `None` when the id is unknown
    fn read(&self, oid: &ObjectId) -> Result<Option<Bytes>>;

    /// Persist raw object bytes under `oid`
    ///
    /// Callers only write ids that are not yet present.
    fn write(&self, oid: &ObjectId, raw: &[u8]) -> Result<()>;

    fn contains(&self, oid: &ObjectId) -> Result<bool>;
}

/// One zlib-compressed file per object under `objects/xx/yyyy...`
#[derive(Debug)]
pub struct LooseBackend {
    path: Box<Path>,
    compression: flate2::Compression,
}

impl LooseBackend {
    pub fn new(path: impl Into<PathBuf>, compression: flate2::Compression) -> Self {
        LooseBackend {
            path: path.into().into_boxed_path(),
            compression,
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.path.join(oid.to_path())
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), self.compression);
        encoder.write_all(data)?;

        Ok(encoder.finish()?)
    }

    fn decompress(oid: &ObjectId, data: &[u8]) -> Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|err| Error::corrupt(oid, format!("cannot inflate object: {err}")))?;

        Ok(decompressed.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{:08x}", rand::random::<u32>())
    }
}

impl ObjectBackend for LooseBackend {
    fn read(&self, oid: &ObjectId) -> Result<Option<Bytes>> {
        match std::fs::read(self.object_path(oid)) {
            Ok(content) => Ok(Some(Self::decompress(oid, &content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, oid: &ObjectId, raw: &[u8]) -> Result<()> {
        let object_path = self.object_path(oid);
        let object_dir = object_path
            .parent()
            .ok_or_else(|| Error::InvalidArgument(format!("invalid object path for {oid}")))?;
        std::fs::create_dir_all(object_dir)?;

        // write next to the final location, then rename into place
        let temp_object_path = object_dir.join(Self::generate_temp_name());
        let compressed = self.compress(raw)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)?;
        file.write_all(&compressed)?;
        file.sync_all()?;
        drop(file);

        if let Err(err) = std::fs::rename(&temp_object_path, &object_path) {
            let _ = std::fs::remove_file(&temp_object_path);
            return Err(err.into());
        }

        Ok(())
    }

    fn contains(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self.object_path(oid).is_file())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<ObjectId, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store bytes under an arbitrary id, bypassing the database checks
    pub fn insert_raw(&self, oid: ObjectId, raw: impl Into<Bytes>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(oid, raw.into());
    }
}

impl ObjectBackend for MemoryBackend {
    fn read(&self, oid: &ObjectId) -> Result<Option<Bytes>> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(oid)
            .cloned())
    }

    fn write(&self, oid: &ObjectId, raw: &[u8]) -> Result<()> {
        self.insert_raw(oid.clone(), Bytes::copy_from_slice(raw));
        Ok(())
    }

    fn contains(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(oid))
    }
}
