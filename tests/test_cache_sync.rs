// tests/test_cache_sync.rs
//
// Mirror population and freshness against an in-memory store.

mod common;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use common::{in_the_future, long_ago, object, Fixture};
use meridian::{
    CacheEntry, CacheError, FileCache, MemoryStore, ObjectMetadata, ObjectRef, ObjectStore,
};

#[test]
fn test_first_access_downloads_once() -> Result<()> {
    let fx = Fixture::new();
    let r = object("gcloud://bucket/data/train.json");
    fx.store.put_object_at(&r, &b"{\"x\":1}\n"[..], long_ago());

    let path = fx.files.ensure_fresh(&r)?;

    assert_eq!(path, fx.cache_root().join("bucket-data-train.json"));
    assert_eq!(fs::read(&path)?, b"{\"x\":1}\n");
    assert_eq!(fx.store.download_count(), 1);
    Ok(())
}

#[test]
fn test_cache_root_is_created_on_demand() -> Result<()> {
    let fx = Fixture::new();
    let r = object("gcloud://bucket/a.txt");
    fx.store.put_object_at(&r, &b"a"[..], long_ago());
    assert!(!fx.cache_root().exists());

    fx.files.ensure_fresh(&r)?;
    assert!(fx.cache_root().is_dir());
    Ok(())
}

#[test]
fn test_fresh_mirror_is_not_downloaded_again() -> Result<()> {
    let fx = Fixture::new();
    let r = object("gcloud://bucket/a/b.txt");
    fx.store.put_object_at(&r, &b"remote"[..], long_ago());

    // A mirror written now is newer than the remote object.
    fs::create_dir_all(fx.cache_root())?;
    fs::write(fx.cache_root().join("bucket-a-b.txt"), b"local copy")?;

    let path = fx.files.ensure_fresh(&r)?;
    assert_eq!(fs::read_to_string(path)?, "local copy");
    assert_eq!(fx.store.download_count(), 0);
    Ok(())
}

#[test]
fn test_newer_remote_replaces_mirror() -> Result<()> {
    let fx = Fixture::new();
    let r = object("gcloud://bucket/model.bin");
    fx.store.put_object_at(&r, &b"version one"[..], long_ago());
    let path = fx.files.ensure_fresh(&r)?;
    assert_eq!(fs::read_to_string(&path)?, "version one");

    fx.store.put_object_at(&r, &b"version two"[..], in_the_future());
    let again = fx.files.ensure_fresh(&r)?;

    assert_eq!(again, path);
    assert_eq!(fs::read_to_string(&path)?, "version two");
    assert_eq!(fx.store.download_count(), 2);
    Ok(())
}

#[test]
fn test_unchanged_remote_is_fetched_once() -> Result<()> {
    let fx = Fixture::new();
    let r = object("gcloud://bucket/k");
    fx.store.put_object_at(&r, &b"same"[..], long_ago());

    fx.files.ensure_fresh(&r)?;
    fx.files.ensure_fresh(&r)?;
    assert_eq!(fx.store.download_count(), 1);
    Ok(())
}

#[test]
fn test_missing_object_and_container() {
    let fx = Fixture::new();

    let err = fx.files.ensure_fresh(&object("gcloud://bucket/nope")).unwrap_err();
    assert!(matches!(err, CacheError::NotFound(_)), "{err}");

    let err = fx.files.ensure_fresh(&object("gcloud://other/k")).unwrap_err();
    assert!(matches!(err, CacheError::NotFound(_)), "{err}");
    assert_eq!(fx.store.download_count(), 0);
}

#[test]
fn test_cache_file_passes_local_paths_through() -> Result<()> {
    let fx = Fixture::new();
    let local = fx.dir.path().join("plain.txt");
    fs::write(&local, b"x")?;

    let target = local.to_string_lossy();
    assert_eq!(fx.files.cache_file(&target)?, local);
    assert_eq!(fx.store.download_count(), 0);

    let r = object("gcloud://bucket/remote.txt");
    fx.store.put_object_at(&r, &b"r"[..], long_ago());
    assert_eq!(
        fx.files.cache_file("gcloud://bucket/remote.txt")?,
        fx.cache_root().join("bucket-remote.txt")
    );
    Ok(())
}

#[test]
fn test_cache_path_does_not_touch_the_store() -> Result<()> {
    let fx = Fixture::new();
    let path = fx.files.cache_path("gcloud://bucket/x/y/z.json.gz")?;
    assert_eq!(path, fx.cache_root().join("bucket-x-y-z.json.gz"));
    assert!(!path.exists());
    assert_eq!(fx.store.download_count(), 0);

    assert!(fx.files.cache_path("gcloud://bucket").is_err());
    Ok(())
}

#[test]
fn test_custom_policy_forces_refresh() -> Result<()> {
    let fx = Fixture::new();
    let files = meridian::FileCache::new(
        fx.files.config().clone(),
        fx.store.clone(),
    )
    .with_policy(|local: &CacheEntry, remote: &ObjectMetadata| local.size == remote.size);

    let r = object("gcloud://bucket/sized.txt");
    fx.store.put_object_at(&r, &b"1234"[..], long_ago());
    files.ensure_fresh(&r)?;
    files.ensure_fresh(&r)?;
    assert_eq!(fx.store.download_count(), 1);

    // Same (old) timestamp, different size: only the custom policy notices.
    fx.store.put_object_at(&r, &b"123456"[..], long_ago());
    let path = files.ensure_fresh(&r)?;
    assert_eq!(fs::read(path)?, b"123456");
    assert_eq!(fx.store.download_count(), 2);
    Ok(())
}

#[test]
fn test_readers_never_see_partial_mirrors() -> Result<()> {
    let fx = Fixture::new();
    let r = object("gcloud://bucket/big.bin");
    let a = vec![b'a'; 256 * 1024];
    let b = vec![b'b'; 256 * 1024];
    fx.store.put_object_at(&r, a.clone(), long_ago());
    let path = fx.files.ensure_fresh(&r)?;

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let done = done.clone();
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let seen = fs::read(&path).expect("mirror stays readable");
                    assert!(seen == a || seen == b, "read a mixed mirror");
                }
            })
        })
        .collect();

    let base = SystemTime::now() + Duration::from_secs(3600);
    for i in 0..20u64 {
        let data = if i % 2 == 0 { b.clone() } else { a.clone() };
        fx.store.put_object_at(&r, data, base + Duration::from_secs(i));
        fx.files.ensure_fresh(&r)?;
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().expect("reader thread");
    }

    assert_eq!(fx.store.download_count(), 21);
    let leftovers: Vec<_> = fs::read_dir(fx.cache_root())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

/// Delegates to a memory store; once `broken` is set, downloads write a few
/// bytes and then fail.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    broken: AtomicBool,
}

impl ObjectStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn resolve(&self, r: &ObjectRef) -> meridian::Result<Option<ObjectMetadata>> {
        self.inner.resolve(r)
    }

    fn download(&self, r: &ObjectRef, destination: &Path) -> meridian::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            fs::write(destination, b"trunc")?;
            return Err(CacheError::transfer(r.to_string(), "connection reset"));
        }
        self.inner.download(r, destination)
    }

    fn upload(&self, r: &ObjectRef, source: &Path, create: bool) -> meridian::Result<()> {
        self.inner.upload(r, source, create)
    }
}

#[test]
fn test_failed_refresh_keeps_previous_mirror() -> Result<()> {
    let fx = Fixture::new();
    let store = Arc::new(FlakyStore {
        inner: fx.store.clone(),
        broken: AtomicBool::new(false),
    });
    let files = FileCache::new(fx.files.config().clone(), store.clone());

    let r = object("gcloud://bucket/model/weights.json");
    fx.store.put_object_at(&r, &b"version 1"[..], long_ago());
    let path = files.ensure_fresh(&r)?;
    assert_eq!(fs::read(&path)?, b"version 1");

    fx.store.put_object_at(&r, &b"version 2"[..], in_the_future());
    store.broken.store(true, Ordering::SeqCst);
    let err = files.ensure_fresh(&r).unwrap_err();
    assert!(err.is_transfer(), "{err}");

    assert_eq!(fs::read(&path)?, b"version 1");
    let names: Vec<_> = fs::read_dir(fx.cache_root())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["bucket-model-weights.json".to_string()]);

    // Once the store recovers the next call picks up the new generation.
    store.broken.store(false, Ordering::SeqCst);
    assert_eq!(fs::read(files.ensure_fresh(&r)?)?, b"version 2");
    Ok(())
}
