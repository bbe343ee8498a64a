use bit_engine::areas::index::Index;
use bit_engine::areas::workspace::{MemoryWorkspace, WorkingTree};
use bit_engine::artifacts::database::database_entry::DatabaseEntry;
use bit_engine::artifacts::index::entry_mode::EntryMode;
use bit_engine::artifacts::index::index_entry::Stage;
use bit_engine::artifacts::objects::object_type::ObjectType;
use bit_engine::{Error, HashAlgorithm, RepositoryOptions};
use fake::Fake;
use fake::faker::lorem::en::{Word, Words};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::BTreeSet;

mod common;
use common::TestRepo;

#[rstest]
#[case(HashAlgorithm::Sha1)]
#[case(HashAlgorithm::Sha256)]
fn staged_files_survive_reopening(#[case] algorithm: HashAlgorithm) -> anyhow::Result<()> {
    let mut repo = TestRepo::init_with(RepositoryOptions::default().with_algorithm(algorithm))?;
    let names = (0..(2..6).fake::<usize>())
        .map(|i| format!("dir{}/{}-{i}.txt", i % 2, Word().fake::<String>()))
        .collect::<BTreeSet<_>>();
    for name in &names {
        repo.write(name, &Words(3..8).fake::<Vec<String>>().join(" "))?;
    }
    repo.repository.add(".")?;

    repo.reopen()?;

    let staged = repo
        .repository
        .index()
        .entries()
        .map(|entry| entry.path.clone())
        .collect::<BTreeSet<_>>();
    assert_eq!(staged, names);
    assert_eq!(repo.repository.algorithm(), algorithm);
    Ok(())
}

#[rstest]
fn writing_the_index_tree_twice_gives_the_same_tree() -> anyhow::Result<()> {
    let mut repo = TestRepo::init()?;
    repo.write("src/lib.rs", "pub fn answer() -> u32 { 42 }\n")?;
    repo.write("src/bin/tool.rs", "fn main() {}\n")?;
    repo.write("Cargo.toml", "[package]\n")?;
    repo.repository.add(".")?;

    let database = repo.repository.database();
    let first = repo.repository.index().write_tree(database)?;
    let writes = database.physical_writes();
    let second = repo.repository.index().write_tree(database)?;

    assert_eq!(first, second);
    assert_eq!(database.physical_writes(), writes);
    Ok(())
}

#[rstest]
fn conflicts_persist_and_block_tree_writes() -> anyhow::Result<()> {
    let mut repo = TestRepo::init()?;
    let database = repo.repository.database();
    let entry = |content: &str| -> anyhow::Result<DatabaseEntry> {
        Ok(DatabaseEntry::new(
            database.put(ObjectType::Blob, content.as_bytes())?,
            EntryMode::REGULAR,
        ))
    };
    let (base, ours, theirs) = (entry("base\n")?, entry("ours\n")?, entry("theirs\n")?);

    let index = repo.repository.index_mut();
    index.add_conflict("notes.txt", Some(base), Some(ours.clone()), Some(theirs))?;
    index.write()?;
    repo.reopen()?;

    let index = repo.repository.index();
    assert_eq!(index.conflicted_paths(), vec!["notes.txt".to_string()]);
    assert_eq!(
        index.entry("notes.txt", Stage::Ours).map(|entry| entry.oid.clone()),
        Some(ours.oid)
    );
    assert!(matches!(
        index.write_tree(repo.repository.database()),
        Err(Error::Conflict(paths)) if paths == vec!["notes.txt".to_string()]
    ));
    assert!(!repo.repository.is_clean()?);

    repo.write("notes.txt", "resolved\n")?;
    repo.repository.add("notes.txt")?;
    assert!(!repo.repository.index().has_conflicts());
    Ok(())
}

#[rstest]
fn deleted_files_are_unstaged() -> anyhow::Result<()> {
    let mut repo = TestRepo::init()?;
    repo.write("keep.txt", "keep\n")?;
    repo.write("drop.txt", "drop\n")?;
    repo.commit_all("two files")?;

    std::fs::remove_file(repo.dir.path().join("drop.txt"))?;
    repo.repository.add(".")?;

    assert!(repo.repository.index().is_tracked("keep.txt"));
    assert!(!repo.repository.index().is_tracked("drop.txt"));
    assert!(repo.repository.add("missing.txt").unwrap_err().is_not_found());
    Ok(())
}

#[rstest]
fn checking_out_a_branch_swaps_tracked_files_only() -> anyhow::Result<()> {
    let mut repo = TestRepo::init()?;
    repo.write("shared.txt", "v1\n")?;
    repo.commit_all("first")?;
    repo.repository.create_branch("old", None)?;
    repo.write("shared.txt", "version 2\n")?;
    repo.write("added/later.txt", "later\n")?;
    repo.commit_all("second")?;
    repo.write("scratch.txt", "untracked\n")?;

    repo.repository.checkout_branch("old")?;

    assert_eq!(repo.read("shared.txt")?, "v1\n");
    assert!(!repo.exists("added/later.txt"));
    assert!(!repo.exists("added"));
    assert_eq!(repo.read("scratch.txt")?, "untracked\n");
    assert_eq!(repo.repository.refs().current_branch()?.map(|b| b.to_string()), Some("old".to_string()));
    assert!(repo.repository.is_clean()?);
    Ok(())
}

#[rstest]
fn checkout_refuses_to_overwrite_untracked_files() -> anyhow::Result<()> {
    let mut repo = TestRepo::init()?;
    repo.write("keep.txt", "keep\n")?;
    repo.commit_all("first")?;
    repo.repository.create_branch("old", None)?;
    repo.write("docs", "a file where old has none\n")?;
    repo.commit_all("second")?;
    repo.repository.create_branch("with-docs", None)?;
    repo.repository.checkout_branch("old")?;

    repo.write("docs", "my own notes\n")?;
    let refused = repo.repository.checkout_branch("with-docs");

    assert!(matches!(refused, Err(Error::InvalidState(reason)) if reason.contains("docs")));
    assert_eq!(repo.read("docs")?, "my own notes\n");
    assert_eq!(repo.repository.refs().current_branch()?.map(|b| b.to_string()), Some("old".to_string()));

    repo.write("docs", "a file where old has none\n")?;
    repo.repository.checkout_branch("with-docs")?;
    assert!(repo.repository.index().is_tracked("docs"));
    Ok(())
}

#[rstest]
fn in_memory_index_stages_from_a_memory_workspace() -> anyhow::Result<()> {
    let database = bit_engine::areas::database::Database::in_memory(HashAlgorithm::Sha1);
    let mut workspace = MemoryWorkspace::with_files([("a/b.txt", "b\n"), ("c.txt", "c\n")]);
    workspace.write_file("run.sh", b"#!/bin/sh\n", EntryMode::EXECUTABLE)?;
    let mut index = Index::in_memory(HashAlgorithm::Sha1);

    for path in workspace.list_files()? {
        index.add(&path, &workspace, &database)?;
    }
    let tree = index.write_tree(&database)?;

    let flattened = database.flatten_tree(&tree)?;
    assert_eq!(
        flattened.keys().cloned().collect::<Vec<_>>(),
        vec!["a/b.txt", "c.txt", "run.sh"]
    );
    assert_eq!(flattened["run.sh"].mode, EntryMode::EXECUTABLE);
    Ok(())
}
