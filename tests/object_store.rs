use assert_fs::TempDir;
use bit_engine::areas::database::Database;
use bit_engine::artifacts::index::entry_mode::EntryMode;
use bit_engine::artifacts::database::database_entry::DatabaseEntry;
use bit_engine::artifacts::objects::object_type::ObjectType;
use bit_engine::artifacts::objects::tree::compare_entry_names;
use bit_engine::artifacts::objects::tree_builder::TreeBuilder;
use bit_engine::{Error, HashAlgorithm, ObjectId};
use fake::Fake;
use fake::faker::lorem::en::Paragraph;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::{fixture, rstest};
use std::cmp::Ordering;
use std::collections::BTreeMap;

mod common;

#[fixture]
fn dir() -> TempDir {
    common::init_tracing();
    TempDir::new().unwrap()
}

fn loose(dir: &TempDir, algorithm: HashAlgorithm) -> Database {
    Database::loose(dir.path().join("objects"), algorithm, flate2::Compression::default())
}

#[rstest]
#[case(HashAlgorithm::Sha1, "ce013625030ba8dba906f756967f9e9ca394464a")]
#[case(
    HashAlgorithm::Sha256,
    "2cf8d83d9ee29543b34a87727421fdecb7e3f3a183d337639025de576db9ebb4"
)]
fn blobs_get_git_compatible_ids(
    dir: TempDir,
    #[case] algorithm: HashAlgorithm,
    #[case] expected: &str,
) -> anyhow::Result<()> {
    let database = loose(&dir, algorithm);

    let oid = database.put(ObjectType::Blob, b"hello\n")?;

    assert_eq!(oid.to_string(), expected);
    assert!(dir.path().join("objects").join(oid.to_path()).is_file());
    Ok(())
}

#[rstest]
fn stored_objects_read_back_from_a_fresh_store(dir: TempDir) -> anyhow::Result<()> {
    let payload = Paragraph(3..6).fake::<String>();
    let oid = loose(&dir, HashAlgorithm::Sha1).put(ObjectType::Blob, payload.as_bytes())?;

    let raw = loose(&dir, HashAlgorithm::Sha1).get(&oid)?;

    assert_eq!(raw.kind, ObjectType::Blob);
    assert_eq!(raw.data.as_ref(), payload.as_bytes());
    Ok(())
}

#[rstest]
fn concurrent_writers_store_one_copy(dir: TempDir) -> anyhow::Result<()> {
    let database = loose(&dir, HashAlgorithm::Sha1);

    let ids = std::thread::scope(|scope| {
        let handles = (0..8)
            .map(|_| scope.spawn(|| database.put(ObjectType::Blob, b"shared content\n")))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("writer thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(database.physical_writes(), 1);
    Ok(())
}

#[rstest]
fn damaged_objects_are_reported_not_repaired(dir: TempDir) -> anyhow::Result<()> {
    let database = loose(&dir, HashAlgorithm::Sha1);
    let oid = database.put(ObjectType::Blob, b"precious\n")?;
    let path = dir.path().join("objects").join(oid.to_path());

    std::fs::write(&path, b"definitely not zlib")?;

    assert!(matches!(database.get(&oid), Err(Error::Corrupt { .. })));
    assert_eq!(std::fs::read(&path)?, b"definitely not zlib");
    Ok(())
}

#[rstest]
fn unknown_ids_are_not_found(dir: TempDir) {
    let database = loose(&dir, HashAlgorithm::Sha1);
    let oid = HashAlgorithm::Sha1.digest(b"never stored");

    assert!(database.get(&oid).unwrap_err().is_not_found());
}

#[rstest]
fn rewriting_an_unchanged_tree_writes_nothing(dir: TempDir) -> anyhow::Result<()> {
    let database = loose(&dir, HashAlgorithm::Sha256);
    let readme = database.put(ObjectType::Blob, b"# readme\n")?;
    let main = database.put(ObjectType::Blob, b"fn main() {}\n")?;

    let mut builder = TreeBuilder::new(&database, None)?;
    builder.insert("README.md", readme.clone(), EntryMode::REGULAR)?;
    builder.insert("src/main.rs", main, EntryMode::REGULAR)?;
    builder.insert("bin/run", readme, EntryMode::EXECUTABLE)?;
    let tree = builder.write()?;
    let writes = database.physical_writes();

    let rebuilt = TreeBuilder::new(&database, Some(&tree))?.write()?;

    assert_eq!(rebuilt, tree);
    assert_eq!(database.physical_writes(), writes);
    assert_eq!(
        database.flatten_tree(&tree)?.keys().cloned().collect::<Vec<_>>(),
        vec!["README.md", "bin/run", "src/main.rs"]
    );
    Ok(())
}

/// Paths built from names that sort differently as files and as directories
fn paths() -> impl Strategy<Value = Vec<(String, bool)>> {
    let name = prop::sample::select(vec!["foo", "foo.txt", "foo-bar", "foo0", "a", "b.c"]);
    let path = prop::collection::vec(name, 1..4).prop_map(|names| names.join("/"));

    prop::collection::vec((path, any::<bool>()), 1..16)
}

/// Every stored tree lists its entries in tree order, without duplicates
fn assert_tree_order(database: &Database, oid: &ObjectId) -> Result<(), TestCaseError> {
    let tree = database.load_tree(oid).map_err(|err| TestCaseError::fail(err.to_string()))?;
    let entries = tree.entries().collect::<Vec<_>>();

    for pair in entries.windows(2) {
        prop_assert_eq!(
            compare_entry_names(&pair[0].name, pair[0].is_tree(), &pair[1].name, pair[1].is_tree()),
            Ordering::Less
        );
    }
    for entry in entries.iter().filter(|entry| entry.is_tree()) {
        assert_tree_order(database, &entry.oid)?;
    }
    Ok(())
}

proptest! {
    #[test]
    fn any_payload_reads_back_unchanged(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
        let dir = TempDir::new().unwrap();
        let database = loose(&dir, HashAlgorithm::Sha1);

        for kind in [ObjectType::Blob, ObjectType::Commit] {
            let oid = database.put(kind, &payload).unwrap();
            let raw = loose(&dir, HashAlgorithm::Sha1).get(&oid).unwrap();

            prop_assert_eq!(raw.kind, kind);
            prop_assert_eq!(raw.data.as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn built_trees_hold_the_last_entry_per_path(inserts in paths()) {
        let database = Database::in_memory(HashAlgorithm::Sha256);
        let mut builder = TreeBuilder::new(&database, None).unwrap();
        let mut expected = BTreeMap::<String, DatabaseEntry>::new();

        for (path, executable) in &inserts {
            let oid = database.put(ObjectType::Blob, path.as_bytes()).unwrap();
            let mode = if *executable { EntryMode::EXECUTABLE } else { EntryMode::REGULAR };
            builder.insert(path, oid.clone(), mode).unwrap();

            let directory = format!("{path}/");
            expected.retain(|existing, _| {
                !existing.starts_with(&directory) && !path.starts_with(&format!("{existing}/"))
            });
            expected.insert(path.clone(), DatabaseEntry::new(oid, mode));
        }
        let root = builder.write().unwrap();

        assert_tree_order(&database, &root)?;
        prop_assert_eq!(database.flatten_tree(&root).unwrap(), expected);
    }
}
