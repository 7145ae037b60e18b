// src/freshness.rs
//
// Decides whether a cached mirror can be served without re-downloading.

use std::path::PathBuf;
use std::time::SystemTime;

use crate::object_ref::ObjectRef;
use crate::object_store::ObjectMetadata;

/// A cached mirror as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub reference: ObjectRef,
    pub local_modified: SystemTime,
    pub size: u64,
}

/// Pluggable freshness check used by [`crate::cache::LocalCache`].
///
/// Any `Fn(&CacheEntry, &ObjectMetadata) -> bool` closure is a policy too.
pub trait FreshnessPolicy: Send + Sync {
    fn is_fresh(&self, local: &CacheEntry, remote: &ObjectMetadata) -> bool;
}

impl<F> FreshnessPolicy for F
where
    F: Fn(&CacheEntry, &ObjectMetadata) -> bool + Send + Sync,
{
    fn is_fresh(&self, local: &CacheEntry, remote: &ObjectMetadata) -> bool {
        self(local, remote)
    }
}

/// Default policy: the mirror is fresh when its mtime is at least the remote
/// object's timestamp. No content hash is involved, so clock skew between
/// this host and the store can make a stale copy look fresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampPolicy;

impl FreshnessPolicy for TimestampPolicy {
    fn is_fresh(&self, local: &CacheEntry, remote: &ObjectMetadata) -> bool {
        match remote.timestamp() {
            Some(remote_time) => local.local_modified >= remote_time,
            None => false,
        }
    }
}
