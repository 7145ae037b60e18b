// src/memory_store.rs
//
// In-process ObjectStore keyed by (container, key), with explicit object
// timestamps and transfer counters. Used by tests and by embedders that want
// the cache layer without a network backend.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::{CacheError, Result};
use crate::object_ref::ObjectRef;
use crate::object_store::{ObjectMetadata, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    created: SystemTime,
}

#[derive(Debug, Default)]
struct Inner {
    containers: HashSet<String>,
    objects: HashMap<(String, String), StoredObject>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_container(&self, container: &str) {
        self.lock().containers.insert(container.to_string());
    }

    /// Store `data` stamped with the current time, creating the container.
    pub fn put_object(&self, reference: &ObjectRef, data: impl Into<Bytes>) {
        self.put_object_at(reference, data, SystemTime::now());
    }

    /// Store `data` with an explicit creation time.
    pub fn put_object_at(&self, reference: &ObjectRef, data: impl Into<Bytes>, created: SystemTime) {
        let mut inner = self.lock();
        inner.containers.insert(reference.container().to_string());
        inner.objects.insert(
            key_of(reference),
            StoredObject {
                data: data.into(),
                created,
            },
        );
    }

    pub fn object(&self, reference: &ObjectRef) -> Option<Bytes> {
        self.lock().objects.get(&key_of(reference)).map(|o| o.data.clone())
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

fn key_of(reference: &ObjectRef) -> (String, String) {
    (reference.container().to_string(), reference.key().to_string())
}

fn check_container(inner: &Inner, reference: &ObjectRef) -> Result<()> {
    if inner.containers.contains(reference.container()) {
        Ok(())
    } else {
        Err(CacheError::NotFound(format!("container {}", reference.container())))
    }
}

impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn resolve(&self, reference: &ObjectRef) -> Result<Option<ObjectMetadata>> {
        let inner = self.lock();
        check_container(&inner, reference)?;
        Ok(inner.objects.get(&key_of(reference)).map(|o| ObjectMetadata {
            size: o.data.len() as u64,
            created: Some(o.created),
            updated: Some(o.created),
        }))
    }

    fn download(&self, reference: &ObjectRef, destination: &Path) -> Result<()> {
        let data = {
            let inner = self.lock();
            check_container(&inner, reference)?;
            inner
                .objects
                .get(&key_of(reference))
                .map(|o| o.data.clone())
                .ok_or_else(|| CacheError::NotFound(reference.to_string()))?
        };
        self.downloads.fetch_add(1, Ordering::SeqCst);
        fs::write(destination, &data).map_err(|e| CacheError::transfer(reference.to_string(), e))
    }

    fn upload(&self, reference: &ObjectRef, source: &Path, create_if_missing: bool) -> Result<()> {
        {
            let inner = self.lock();
            check_container(&inner, reference)?;
            if !create_if_missing && !inner.objects.contains_key(&key_of(reference)) {
                return Err(CacheError::NotFound(reference.to_string()));
            }
        }
        let data = fs::read(source).map_err(|e| CacheError::transfer(reference.to_string(), e))?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.put_object(reference, data);
        Ok(())
    }
}
