// src/lib.rs
//
// Crate root: module declarations plus the public re-exports.
//
// meridian mirrors remote objects (`gcloud://bucket/key`) into a local cache
// directory and hands out ordinary byte streams over them. Writes to remote
// destinations are buffered locally and uploaded when the handle is closed.

pub mod constants;
pub mod config;
pub mod error;
pub mod object_ref;

// Remote store backends
pub mod object_store;
pub mod gcs_client;
pub mod file_store;
pub mod memory_store;

// Local mirror
pub mod freshness;
pub mod cache;

// Streams
pub mod codec;
pub mod stream;
pub mod scoped_writer;

pub mod context;
pub mod json;

// ===== Re-exports =====
pub use crate::error::{CacheError, Result};
pub use crate::config::CacheConfig;
pub use crate::object_ref::ObjectRef;

pub use crate::object_store::{ObjectMetadata, ObjectStore};
pub use crate::gcs_client::GcsStore;
pub use crate::file_store::DirectoryStore;
pub use crate::memory_store::MemoryStore;

pub use crate::freshness::{CacheEntry, FreshnessPolicy, TimestampPolicy};
pub use crate::cache::{compute_once, LocalCache};

pub use crate::codec::{Codec, Reader, Writer};
pub use crate::stream::{Access, FileHandle, Location, OpenMode};
pub use crate::scoped_writer::UploadOnClose;

pub use crate::context::FileCache;
pub use crate::json::{read_json, read_json_lines, write_json, write_json_lines};
