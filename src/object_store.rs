// src/object_store.rs
//
// Pluggable remote object-store abstraction.
// Backends: GCS (gcs_client.rs), a local directory tree (file_store.rs),
// and an in-process map (memory_store.rs).
//
// All calls block the calling thread. Backends are shared through
// `Arc<dyn ObjectStore>` and must tolerate concurrent callers.

use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;
use crate::object_ref::ObjectRef;

/// What a backend reports about an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    /// Creation time of the current object generation.
    pub created: Option<SystemTime>,
    /// Last metadata or content update.
    pub updated: Option<SystemTime>,
}

impl ObjectMetadata {
    /// Timestamp compared against the cached copy: creation time of the
    /// current generation, falling back to the update time.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.created.or(self.updated)
    }
}

/// The three operations the cache layer needs from a remote store.
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the container exists but the object does not;
    /// `Err(NotFound)` when the container itself is missing.
    fn resolve(&self, reference: &ObjectRef) -> Result<Option<ObjectMetadata>>;

    /// Write the whole object to `destination`, replacing its content.
    fn download(&self, reference: &ObjectRef, destination: &Path) -> Result<()>;

    /// Push the whole content of `source`. With `create_if_missing == false`
    /// the object must already exist, otherwise `NotFound`.
    fn upload(&self, reference: &ObjectRef, source: &Path, create_if_missing: bool) -> Result<()>;

    fn exists(&self, reference: &ObjectRef) -> Result<bool> {
        Ok(self.resolve(reference)?.is_some())
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resolve(&self, reference: &ObjectRef) -> Result<Option<ObjectMetadata>> {
        (**self).resolve(reference)
    }

    fn download(&self, reference: &ObjectRef, destination: &Path) -> Result<()> {
        (**self).download(reference, destination)
    }

    fn upload(&self, reference: &ObjectRef, source: &Path, create_if_missing: bool) -> Result<()> {
        (**self).upload(reference, source, create_if_missing)
    }
}
