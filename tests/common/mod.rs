// tests/common/mod.rs
//
// Shared fixtures: a FileCache over an in-memory store and a temp cache dir.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use meridian::{CacheConfig, FileCache, MemoryStore, ObjectRef};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub files: FileCache,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(MemoryStore::new());
        store.create_container("bucket");
        let config = CacheConfig::default().with_cache_root(dir.path().join("cache"));
        let files = FileCache::new(config, store.clone());
        Self { dir, store, files }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }
}

pub fn object(uri: &str) -> ObjectRef {
    ObjectRef::parse(uri).expect("valid object reference")
}

/// A point in time well before anything the tests write locally.
pub fn long_ago() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000)
}

/// A point in time after anything the tests write locally.
pub fn in_the_future() -> SystemTime {
    SystemTime::now() + Duration::from_secs(3600)
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("gzip write");
    enc.finish().expect("gzip finish")
}

pub fn have_bzcat() -> bool {
    std::process::Command::new("bzcat")
        .arg("--help")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}
