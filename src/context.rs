// src/context.rs
//! Top-level entry point: [`FileCache`].
//!
//! One `FileCache` owns the remote store, the cache directory and the
//! configuration; construct it once and share it. Collaborators (JSON
//! readers/writers, training-data loaders) should only go through
//! [`FileCache::open_ctx`] and friends.
//!
//! ```no_run
//! use std::io::{BufRead, Write};
//! use std::sync::Arc;
//! use meridian::{CacheConfig, FileCache, MemoryStore, OpenMode};
//!
//! # fn main() -> meridian::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.create_container("bucket");
//! let files = FileCache::new(CacheConfig::default().with_cache_root("/tmp/mirror"), store);
//!
//! let mut out = files.open_ctx("gcloud://bucket/data/out.json", OpenMode::WRITE, None)?;
//! out.write_all(b"{\"a\":1}\n")?;
//! out.close()?; // uploads
//!
//! let input = files.open_ctx("gcloud://bucket/data/out.json", OpenMode::READ, None)?;
//! for line in input.lines() {
//!     println!("{}", line?);
//! }
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{compute_once, LocalCache};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::freshness::FreshnessPolicy;
use crate::gcs_client::GcsStore;
use crate::object_ref::ObjectRef;
use crate::object_store::ObjectStore;
use crate::scoped_writer::UploadOnClose;
use crate::stream::{FileHandle, Location, OpenMode};

pub struct FileCache {
    config: CacheConfig,
    store: Arc<dyn ObjectStore>,
    cache: LocalCache,
}

impl FileCache {
    pub fn new(config: CacheConfig, store: Arc<dyn ObjectStore>) -> Self {
        let cache = LocalCache::new(&config.cache_root);
        Self { config, store, cache }
    }

    /// Configuration from the environment, backed by Google Cloud Storage.
    pub fn from_env() -> Result<Self> {
        let config = CacheConfig::from_env();
        Ok(Self::new(config, Arc::new(GcsStore::new()?)))
    }

    /// Replace the freshness check (default: timestamps).
    pub fn with_policy(mut self, policy: impl FreshnessPolicy + 'static) -> Self {
        self.cache = self.cache.with_policy(policy);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn locate(&self, target: &str) -> Result<Location> {
        Location::classify(target, &self.config.remote_scheme)
    }

    /// Cache path a remote target maps to, without contacting the store.
    pub fn cache_path(&self, target: &str) -> Result<PathBuf> {
        match self.locate(target)? {
            Location::Remote(reference) => Ok(self.cache.path_for(&reference)),
            Location::Local(_) => Err(CacheError::Unsupported(format!(
                "not a {}:// reference: {}",
                self.config.remote_scheme, target
            ))),
        }
    }

    pub fn ensure_fresh(&self, reference: &ObjectRef) -> Result<PathBuf> {
        self.cache.ensure_fresh(self.store.as_ref(), reference)
    }

    /// Local path holding the content of `target`: local paths are returned
    /// as-is, remote ones are mirrored first.
    pub fn cache_file(&self, target: &str) -> Result<PathBuf> {
        match self.locate(target)? {
            Location::Local(path) => Ok(path),
            Location::Remote(reference) => self.ensure_fresh(&reference),
        }
    }

    /// Stream over `target`. Remote targets are readable only; remote writes
    /// must go through [`FileCache::open_ctx`].
    pub fn open(&self, target: &str, mode: OpenMode, encoding: Option<&str>) -> Result<FileHandle> {
        let path = match self.locate(target)? {
            Location::Local(path) => path,
            Location::Remote(reference) if mode.is_read() => self.ensure_fresh(&reference)?,
            Location::Remote(reference) => {
                return Err(CacheError::Unsupported(format!(
                    "direct {} of remote object {}; use open_ctx",
                    mode, reference
                )));
            }
        };
        debug!("Opening {} ({})", path.display(), mode);
        FileHandle::open_local(&path, mode, encoding, &self.config.bzip2_command)
    }

    /// Single entry point for collaborators: local paths and remote reads go
    /// through [`FileCache::open`]; remote writes get an upload-on-close handle.
    pub fn open_ctx(&self, target: &str, mode: OpenMode, encoding: Option<&str>) -> Result<FileHandle> {
        match self.locate(target)? {
            Location::Remote(reference) if !mode.is_read() => Ok(FileHandle::Upload(
                UploadOnClose::create(reference, Arc::clone(&self.store), mode, encoding)?,
            )),
            _ => self.open(target, mode, encoding),
        }
    }

    /// Run `f` against a handle from [`FileCache::open_ctx`]. The handle is
    /// closed (and a remote destination uploaded) only if `f` succeeds; on
    /// error it is dropped and the error returned unchanged.
    pub fn with_writer<T, F>(
        &self,
        target: &str,
        mode: OpenMode,
        encoding: Option<&str>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut FileHandle) -> Result<T>,
    {
        let mut handle = self.open_ctx(target, mode, encoding)?;
        let value = f(&mut handle)?;
        handle.close()?;
        Ok(value)
    }

    /// Build the local artifact at `target` with `f` unless it already
    /// exists; see [`compute_once`]. Remote targets are refused.
    pub fn cached_op<F>(&self, target: &str, f: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        match self.locate(target)? {
            Location::Local(path) => compute_once(&path, f),
            Location::Remote(reference) => Err(CacheError::Unsupported(format!(
                "cached_op needs a local path, got {}",
                reference
            ))),
        }
    }
}
