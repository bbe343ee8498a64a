//! Content-addressable object database
//!
//! Objects are keyed by the digest of `<type> <size>\0<payload>`. Writing content
//! that is already present is a no-op returning the same id, and every read
//! re-hashes the stored bytes so corruption is reported instead of returned.
//!
//! Reads take no lock. Writes are serialized per database so the
//! check-then-write of deduplication cannot race with itself.

use crate::areas::backend::{LooseBackend, MemoryBackend, ObjectBackend};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{
    Object, ObjectBox, Unpackable, hash_object, object_header, parse_header,
};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

/// An object as stored: its type and undecoded payload
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RawObject {
    pub kind: ObjectType,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct Database {
    backend: Box<dyn ObjectBackend>,
    algorithm: HashAlgorithm,
    write_lock: Mutex<()>,
    physical_writes: AtomicUsize,
}

impl Database {
    pub fn new(backend: impl ObjectBackend + 'static, algorithm: HashAlgorithm) -> Self {
        Database {
            backend: Box::new(backend),
            algorithm,
            write_lock: Mutex::new(()),
            physical_writes: AtomicUsize::new(0),
        }
    }

    /// Loose object store rooted at an `objects` directory
    pub fn loose(
        path: impl Into<PathBuf>,
        algorithm: HashAlgorithm,
        compression: flate2::Compression,
    ) -> Self {
        Self::new(LooseBackend::new(path, compression), algorithm)
    }

    pub fn in_memory(algorithm: HashAlgorithm) -> Self {
        Self::new(MemoryBackend::new(), algorithm)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Number of objects physically written by this instance
    pub fn physical_writes(&self) -> usize {
        self.physical_writes.load(Ordering::Relaxed)
    }

    fn check_id(&self, oid: &ObjectId) -> Result<()> {
        if oid.len() != self.algorithm.digest_len() {
            return Err(Error::InvalidArgument(format!(
                "object id {oid} does not belong to a {} store",
                self.algorithm
            )));
        }

        Ok(())
    }

    /// Hash and store a payload, returning its id
    pub fn put(&self, kind: ObjectType, payload: &[u8]) -> Result<ObjectId> {
        let oid = hash_object(self.algorithm, kind, payload);

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.backend.contains(&oid)? {
            trace!(%oid, %kind, "object already stored");
            return Ok(oid);
        }

        let mut raw = object_header(kind, payload.len());
        raw.extend_from_slice(payload);
        self.backend.write(&oid, &raw)?;
        self.physical_writes.fetch_add(1, Ordering::Relaxed);

        debug!(%oid, %kind, size = payload.len(), "stored object");
        Ok(oid)
    }

    /// Fetch and verify a stored object
    pub fn get(&self, oid: &ObjectId) -> Result<RawObject> {
        self.check_id(oid)?;

        let raw = self
            .backend
            .read(oid)?
            .ok_or_else(|| Error::NotFound(format!("object {oid}")))?;

        if &self.algorithm.digest(&raw) != oid {
            return Err(Error::corrupt(oid, "content does not match its id"));
        }
        let (kind, size, offset) =
            parse_header(&raw).map_err(|err| Error::corrupt(oid, err.to_string()))?;
        if raw.len() - offset != size {
            return Err(Error::corrupt(
                oid,
                format!("declared size {size}, found {}", raw.len() - offset),
            ));
        }

        Ok(RawObject::new(kind, raw.slice(offset..)))
    }

    pub fn contains(&self, oid: &ObjectId) -> Result<bool> {
        self.check_id(oid)?;
        self.backend.contains(oid)
    }

    pub fn store(&self, object: &impl Object) -> Result<ObjectId> {
        self.put(object.object_type(), &object.serialize()?)
    }

    pub fn load(&self, oid: &ObjectId) -> Result<ObjectBox> {
        let raw = self.get(oid)?;
        ObjectBox::decode(raw.kind, raw.data, self.algorithm)
    }

    fn load_as<T: Unpackable>(&self, oid: &ObjectId, expected: ObjectType) -> Result<T> {
        let raw = self.get(oid)?;
        if raw.kind != expected {
            return Err(Error::KindMismatch {
                id: oid.clone(),
                expected,
                actual: raw.kind,
            });
        }

        T::deserialize(raw.data, self.algorithm)
    }

    pub fn load_blob(&self, oid: &ObjectId) -> Result<Blob> {
        self.load_as(oid, ObjectType::Blob)
    }

    pub fn load_tree(&self, oid: &ObjectId) -> Result<Tree> {
        self.load_as(oid, ObjectType::Tree)
    }

    pub fn load_commit(&self, oid: &ObjectId) -> Result<Commit> {
        self.load_as(oid, ObjectType::Commit)
    }

    pub fn load_tag(&self, oid: &ObjectId) -> Result<Tag> {
        self.load_as(oid, ObjectType::Tag)
    }

    /// Resolve a commit, tag or tree id to the id of a tree
    pub fn peel_to_tree(&self, oid: &ObjectId) -> Result<ObjectId> {
        let mut current = oid.clone();

        loop {
            match self.load(&current)? {
                ObjectBox::Tree(_) => return Ok(current),
                ObjectBox::Commit(commit) => return Ok(commit.tree_oid().clone()),
                ObjectBox::Tag(tag) => current = tag.target().clone(),
                ObjectBox::Blob(_) => {
                    return Err(Error::KindMismatch {
                        id: current,
                        expected: ObjectType::Tree,
                        actual: ObjectType::Blob,
                    });
                }
            }
        }
    }

    /// Map every non-tree path below a tree to its entry
    pub fn flatten_tree(&self, tree_oid: &ObjectId) -> Result<BTreeMap<String, DatabaseEntry>> {
        let mut entries = BTreeMap::new();
        self.flatten_into(tree_oid, "", &mut entries)?;

        Ok(entries)
    }

    fn flatten_into(
        &self,
        tree_oid: &ObjectId,
        prefix: &str,
        entries: &mut BTreeMap<String, DatabaseEntry>,
    ) -> Result<()> {
        for entry in self.load_tree(tree_oid)?.into_entries() {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };

            if entry.is_tree() {
                self.flatten_into(&entry.oid, &path, entries)?;
            } else {
                entries.insert(path, entry.to_database_entry());
            }
        }

        Ok(())
    }

    /// Compare two trees (either may be absent) path by path
    pub fn tree_diff(
        &self,
        old_oid: Option<&ObjectId>,
        new_oid: Option<&ObjectId>,
    ) -> Result<TreeDiff> {
        let old = old_oid
            .map(|oid| self.flatten_tree(oid))
            .transpose()?
            .unwrap_or_default();
        let new = new_oid
            .map(|oid| self.flatten_tree(oid))
            .transpose()?
            .unwrap_or_default();

        Ok(TreeDiff::between(&old, &new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::EntryMode;
    use crate::artifacts::objects::signature::Signature;
    use crate::artifacts::objects::tree::TreeEntry;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> Database {
        Database::in_memory(HashAlgorithm::Sha1)
    }

    #[rstest]
    fn put_then_get_returns_the_payload(database: Database) {
        let oid = database.put(ObjectType::Blob, b"hello\n").unwrap();

        assert_eq!(oid.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert_eq!(
            database.get(&oid).unwrap(),
            RawObject::new(ObjectType::Blob, Bytes::from_static(b"hello\n"))
        );
    }

    #[rstest]
    fn duplicate_puts_write_once(database: Database) {
        let first = database.put(ObjectType::Blob, b"same").unwrap();
        let second = database.put(ObjectType::Blob, b"same").unwrap();

        assert_eq!(first, second);
        assert_eq!(database.physical_writes(), 1);
    }

    #[rstest]
    fn same_payload_with_other_kind_is_another_object(database: Database) {
        let blob = database.put(ObjectType::Blob, b"").unwrap();
        let tree = database.put(ObjectType::Tree, b"").unwrap();

        assert_ne!(blob, tree);
        assert_eq!(database.physical_writes(), 2);
    }

    #[rstest]
    fn missing_objects_are_not_found(database: Database) {
        let oid = HashAlgorithm::Sha1.digest(b"nothing");

        assert!(database.get(&oid).unwrap_err().is_not_found());
        assert!(!database.contains(&oid).unwrap());
    }

    #[rstest]
    fn ids_of_another_algorithm_are_rejected(database: Database) {
        let oid = HashAlgorithm::Sha256.digest(b"nothing");

        assert!(matches!(
            database.get(&oid),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn tampered_content_is_corrupt() {
        let backend = MemoryBackend::new();
        let oid = hash_object(HashAlgorithm::Sha1, ObjectType::Blob, b"original");
        backend.insert_raw(oid.clone(), Bytes::from_static(b"blob 8\0tampered"));
        let database = Database::new(backend, HashAlgorithm::Sha1);

        assert!(matches!(database.get(&oid), Err(Error::Corrupt { .. })));
    }

    #[rstest]
    fn loose_objects_survive_reopening() {
        let dir = TempDir::new().unwrap();
        let oid = Database::loose(dir.path(), HashAlgorithm::Sha256, Default::default())
            .put(ObjectType::Blob, b"persisted")
            .unwrap();

        let reopened = Database::loose(dir.path(), HashAlgorithm::Sha256, Default::default());
        assert_eq!(oid.len(), 32);
        assert_eq!(reopened.load_blob(&oid).unwrap().content().as_ref(), b"persisted");
    }

    #[rstest]
    fn typed_loads_check_the_kind(database: Database) {
        let oid = database.put(ObjectType::Blob, b"text").unwrap();

        assert!(matches!(
            database.load_tree(&oid),
            Err(Error::KindMismatch {
                expected: ObjectType::Tree,
                actual: ObjectType::Blob,
                ..
            })
        ));
    }

    #[rstest]
    fn commits_peel_and_flatten(database: Database) {
        let blob = database.put(ObjectType::Blob, b"x").unwrap();
        let inner = database
            .store(&Tree::from_entries([TreeEntry::new("file".into(), EntryMode::REGULAR, blob.clone())]).unwrap())
            .unwrap();
        let root = database
            .store(
                &Tree::from_entries([
                    TreeEntry::new("dir".into(), EntryMode::Directory, inner),
                    TreeEntry::new("top".into(), EntryMode::EXECUTABLE, blob.clone()),
                ])
                .unwrap(),
            )
            .unwrap();
        let signature = Signature::new_with_time("A", "a@example.com", 0, 0).unwrap();
        let commit = database
            .store(&Commit::new(root.clone(), vec![], signature.clone(), signature, "m\n"))
            .unwrap();

        assert_eq!(database.peel_to_tree(&commit).unwrap(), root);

        let flattened = database.flatten_tree(&root).unwrap();
        assert_eq!(
            flattened.into_iter().collect::<Vec<_>>(),
            vec![
                ("dir/file".to_string(), DatabaseEntry::new(blob.clone(), EntryMode::REGULAR)),
                ("top".to_string(), DatabaseEntry::new(blob, EntryMode::EXECUTABLE)),
            ]
        );
    }
}
