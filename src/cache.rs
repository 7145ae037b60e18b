// src/cache.rs
//
// Local mirror of remote objects.
//
// Every reference maps to `<root>/<container>-<key with '/' -> '-'>`. A mirror
// is (re)populated by downloading into a `.tmp` file in the same directory and
// renaming it over the final path, so readers of the final path only ever see
// a complete file. Processes sharing the directory may download the same object
// twice; that wastes work but cannot corrupt an entry. Entries are never evicted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::constants::TEMP_SUFFIX;
use crate::error::{CacheError, Result};
use crate::freshness::{CacheEntry, FreshnessPolicy, TimestampPolicy};
use crate::object_ref::ObjectRef;
use crate::object_store::ObjectStore;

#[derive(Clone)]
pub struct LocalCache {
    root: PathBuf,
    policy: Arc<dyn FreshnessPolicy>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").field("root", &self.root).finish_non_exhaustive()
    }
}

impl LocalCache {
    /// Cache rooted at `root` using [`TimestampPolicy`].
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            policy: Arc::new(TimestampPolicy),
        }
    }

    pub fn with_policy(mut self, policy: impl FreshnessPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic mirror path of `reference`.
    pub fn path_for(&self, reference: &ObjectRef) -> PathBuf {
        self.root.join(reference.flattened_name())
    }

    /// Create the root and its ancestors. Idempotent.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// The mirror of `reference` if one is on disk.
    pub fn entry(&self, reference: &ObjectRef) -> Result<Option<CacheEntry>> {
        let path = self.path_for(reference);
        let metadata = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(CacheEntry {
            path,
            reference: reference.clone(),
            local_modified: metadata.modified()?,
            size: metadata.len(),
        }))
    }

    /// Make sure a fresh mirror of `reference` exists and return its path.
    ///
    /// Downloads only when the mirror is missing or the policy calls it stale.
    /// A failed download leaves any previous mirror untouched.
    pub fn ensure_fresh(&self, store: &dyn ObjectStore, reference: &ObjectRef) -> Result<PathBuf> {
        info!("Caching: {}", reference);
        let path = self.path_for(reference);
        self.ensure_root()?;

        let remote = store
            .resolve(reference)?
            .ok_or_else(|| CacheError::NotFound(reference.to_string()))?;

        if let Some(entry) = self.entry(reference)? {
            info!(
                "Cache exists {} ({}, {})",
                reference,
                format_time(entry.local_modified),
                remote.timestamp().map(format_time).unwrap_or_else(|| "-".to_string()),
            );
            if self.policy.is_fresh(&entry, &remote) {
                info!("Cache file exists and is up to date: {}", reference);
                return Ok(path);
            }
        }

        self.populate(store, reference, &path)?;
        Ok(path)
    }

    fn populate(&self, store: &dyn ObjectStore, reference: &ObjectRef, path: &Path) -> Result<()> {
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.", reference.flattened_name()))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.root)?;
        debug!("Downloading {} via {} into {}", reference, store.name(), staging.path().display());

        // On error the staging file is dropped and removed.
        store.download(reference, staging.path())?;
        staging.persist(path).map_err(|e| e.error)?;

        debug!("Cache populated: {}", path.display());
        Ok(())
    }
}

/// Produce `target` once: if it exists it is returned as-is and `f` is not
/// called. Otherwise `f` fills a temp file in the target's directory, which
/// is synced and renamed over `target`. If `f` fails, nothing is left behind.
///
/// Two callers racing on a missing target may both run `f`; the last rename
/// wins and readers never see a partial file.
pub fn compute_once<F>(target: &Path, f: F) -> Result<PathBuf>
where
    F: FnOnce(&mut fs::File) -> Result<()>,
{
    if target.exists() {
        debug!("Reusing {}", target.display());
        return Ok(target.to_path_buf());
    }
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CacheError::Unsupported(format!("not a file path: {}", target.display())))?;

    let mut staging = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    info!("Computing {}", target.display());
    f(staging.as_file_mut())?;
    staging.as_file().sync_data()?;
    staging.persist(target).map_err(|e| e.error)?;
    Ok(target.to_path_buf())
}

fn format_time(t: SystemTime) -> String {
    humantime::format_rfc3339_seconds(t).to_string()
}
