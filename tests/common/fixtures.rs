use larder::storage::{InMemoryStorage, RedbStorage, Repository};
use tempfile::TempDir;

/// A backend under test, plus the directory keeping its file alive
pub struct Backend {
    pub name: &'static str,
    pub repo: Box<dyn Repository>,
    _dir: Option<TempDir>,
}

pub fn redb() -> Backend {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let repo = RedbStorage::open(dir.path().join("system.db")).expect("Failed to open store");
    Backend {
        name: "redb",
        repo: Box::new(repo),
        _dir: Some(dir),
    }
}

pub fn memory() -> Backend {
    Backend {
        name: "memory",
        repo: Box::new(InMemoryStorage::new()),
        _dir: None,
    }
}

/// Every backend, so contract tests run against each implementation
pub fn backends() -> Vec<Backend> {
    vec![redb(), memory()]
}

/// Fill `bucket` with keys `"1"..="n"` holding `"v1"..="vn"`
pub fn seed(repo: &dyn Repository, bucket: &str, n: usize) {
    for i in 1..=n {
        repo.update(bucket, i.to_string().as_bytes(), format!("v{}", i).as_bytes())
            .expect("Failed to seed bucket");
    }
}

/// Fill `bucket` with zero-padded keys so key order matches numeric order
pub fn seed_padded(repo: &dyn Repository, bucket: &str, n: usize) {
    for i in 0..n {
        repo.update(bucket, format!("{:03}", i).as_bytes(), format!("item-{:03}", i).as_bytes())
            .expect("Failed to seed bucket");
    }
}
