#![allow(dead_code)]

use assert_fs::TempDir;
use assert_fs::fixture::{FileWriteStr, PathChild};
use bit_engine::artifacts::objects::signature::Signature;
use bit_engine::{ObjectId, Repository, RepositoryOptions};
use fake::Fake;
use fake::faker::internet::en::FreeEmail;
use fake::faker::lorem::en::Words;
use fake::faker::name::en::Name;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness, honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn random_signature() -> Signature {
    let name = Name().fake::<String>();
    let email = FreeEmail().fake::<String>();

    Signature::new_with_time(name, email, 1_700_000_000, 120).expect("valid signature")
}

pub fn random_message() -> String {
    Words(3..6).fake::<Vec<String>>().join(" ")
}

/// A repository in a temporary directory, removed on drop
pub struct TestRepo {
    pub dir: TempDir,
    pub repository: Repository,
}

impl TestRepo {
    pub fn init() -> anyhow::Result<Self> {
        Self::init_with(RepositoryOptions::default())
    }

    pub fn init_with(options: RepositoryOptions) -> anyhow::Result<Self> {
        init_tracing();
        let dir = TempDir::new()?;
        let repository = Repository::init(dir.path(), options)?;

        Ok(TestRepo { dir, repository })
    }

    pub fn write(&self, path: &str, content: &str) -> anyhow::Result<()> {
        self.dir.child(path).write_str(content)?;
        Ok(())
    }

    pub fn read(&self, path: &str) -> anyhow::Result<String> {
        Ok(std::fs::read_to_string(self.dir.child(path).path())?)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.dir.child(path).path().exists()
    }

    /// Stage everything and commit it with `message`
    pub fn commit_all(&mut self, message: &str) -> anyhow::Result<ObjectId> {
        self.repository.add(".")?;
        let signature = random_signature();

        Ok(self
            .repository
            .commit(signature.clone(), signature, format!("{message}\n"))?)
    }

    pub fn reopen(&mut self) -> anyhow::Result<()> {
        self.repository = Repository::open(self.dir.path())?;
        Ok(())
    }
}
