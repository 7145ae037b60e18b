// src/file_store.rs
//
// DirectoryStore: a local directory tree acting as a remote object store.
// Gives the same ObjectStore interface without network access, so cache
// behavior can be exercised offline and across processes.
//
// Layout:
// - container  -> `<root>/<container>/` (must exist, like a bucket)
// - object key -> `<root>/<container>/<key>` (intermediate dirs created on upload)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::TEMP_SUFFIX;
use crate::error::{CacheError, Result};
use crate::object_ref::ObjectRef;
use crate::object_store::{ObjectMetadata, ObjectStore};

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory backing `container`. Idempotent.
    pub fn create_container(&self, container: &str) -> Result<()> {
        fs::create_dir_all(self.root.join(container))?;
        Ok(())
    }

    fn container_path(&self, reference: &ObjectRef) -> Result<PathBuf> {
        let dir = self.root.join(reference.container());
        if !dir.is_dir() {
            return Err(CacheError::NotFound(format!(
                "container {} (no directory {})",
                reference.container(),
                dir.display()
            )));
        }
        Ok(dir)
    }

    fn object_path(&self, reference: &ObjectRef) -> Result<PathBuf> {
        let key = reference.key();
        if key.split('/').any(|part| part == "..") {
            return Err(CacheError::MalformedReference(format!(
                "key escapes its container: {}",
                reference
            )));
        }
        Ok(self.container_path(reference)?.join(key))
    }
}

fn metadata_from_path(path: &Path) -> io::Result<ObjectMetadata> {
    let metadata = fs::metadata(path)?;
    let modified = metadata.modified().ok();
    Ok(ObjectMetadata {
        size: metadata.len(),
        // Each upload replaces the file, so its mtime is the generation time.
        created: modified,
        updated: modified,
    })
}

impl ObjectStore for DirectoryStore {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn resolve(&self, reference: &ObjectRef) -> Result<Option<ObjectMetadata>> {
        let path = self.object_path(reference)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(metadata_from_path(&path)?))
    }

    fn download(&self, reference: &ObjectRef, destination: &Path) -> Result<()> {
        let path = self.object_path(reference)?;
        if !path.is_file() {
            return Err(CacheError::NotFound(reference.to_string()));
        }
        let copied = fs::copy(&path, destination)
            .map_err(|e| CacheError::transfer(reference.to_string(), e))?;
        debug!("DirectoryStore GET {}: {} bytes", reference, copied);
        Ok(())
    }

    fn upload(&self, reference: &ObjectRef, source: &Path, create_if_missing: bool) -> Result<()> {
        let path = self.object_path(reference)?;
        if !create_if_missing && !path.is_file() {
            return Err(CacheError::NotFound(reference.to_string()));
        }
        let parent = match path.parent() {
            Some(parent) => parent,
            None => return Err(CacheError::MalformedReference(reference.to_string())),
        };
        fs::create_dir_all(parent)?;

        // Readers of the object path see the old or the new content, never a
        // mix. Each upload stages in its own file, so concurrent uploads of
        // one key only race on the final rename.
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let transfer = |e: io::Error| CacheError::transfer(reference.to_string(), e);
        let mut staging = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(transfer)?;
        let mut input = fs::File::open(source).map_err(transfer)?;
        // On error the staging file is dropped and removed.
        let copied = io::copy(&mut input, staging.as_file_mut()).map_err(transfer)?;
        staging.persist(&path).map_err(|e| transfer(e.error))?;
        debug!("DirectoryStore PUT {}: {} bytes", reference, copied);
        Ok(())
    }
}
