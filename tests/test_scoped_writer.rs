// tests/test_scoped_writer.rs
//
// Upload-on-close semantics for remote destinations.

mod common;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use common::{gzip, object, Fixture};
use meridian::{
    CacheError, FileHandle, ObjectMetadata, ObjectRef, ObjectStore, OpenMode, UploadOnClose,
};

#[test]
fn test_close_uploads_exact_bytes() -> Result<()> {
    let fx = Fixture::new();

    let mut out = fx.files.open_ctx("gcloud://bucket/data/out.json", OpenMode::WRITE, None)?;
    assert!(out.is_upload());
    out.write_all(b"{\"a\":1}\n")?;
    assert_eq!(fx.store.upload_count(), 0);
    out.close()?;

    let stored = fx.store.object(&object("gcloud://bucket/data/out.json"));
    assert_eq!(stored.as_deref(), Some(&b"{\"a\":1}\n"[..]));
    assert_eq!(fx.store.upload_count(), 1);
    Ok(())
}

#[test]
fn test_drop_without_close_uploads_nothing() -> Result<()> {
    let fx = Fixture::new();
    {
        let mut out = fx.files.open_ctx("gcloud://bucket/abandoned.txt", OpenMode::WRITE, None)?;
        out.write_all(b"never sent")?;
    }
    assert_eq!(fx.store.upload_count(), 0);
    assert!(fx.store.object(&object("gcloud://bucket/abandoned.txt")).is_none());
    Ok(())
}

#[test]
fn test_error_in_body_skips_upload() {
    let fx = Fixture::new();
    let result: meridian::Result<()> =
        fx.files.with_writer("gcloud://bucket/partial.txt", OpenMode::WRITE, None, |out| {
            out.write_all(b"half")?;
            Err(CacheError::Unsupported("stop".into()))
        });

    assert!(matches!(result, Err(CacheError::Unsupported(ref m)) if m == "stop"));
    assert_eq!(fx.store.upload_count(), 0);
}

#[test]
fn test_with_writer_uploads_on_success() -> Result<()> {
    let fx = Fixture::new();
    let n = fx.files.with_writer("gcloud://bucket/lines.txt", OpenMode::WRITE, None, |out| {
        for i in 0..3 {
            writeln!(out, "line {}", i)?;
        }
        Ok(3)
    })?;
    assert_eq!(n, 3);
    let stored = fx.store.object(&object("gcloud://bucket/lines.txt")).unwrap();
    assert_eq!(&stored[..], b"line 0\nline 1\nline 2\n");
    Ok(())
}

#[test]
fn test_with_writer_passes_encoding_through() -> Result<()> {
    let fx = Fixture::new();

    let mut ran = false;
    let err = fx
        .files
        .with_writer("gcloud://bucket/enc.txt", OpenMode::WRITE, Some("latin-1"), |_| {
            ran = true;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, CacheError::Unsupported(_)), "{err}");
    assert!(!ran);
    assert_eq!(fx.store.upload_count(), 0);

    fx.files.with_writer("gcloud://bucket/enc.txt", OpenMode::WRITE, Some("UTF-8"), |out| {
        out.write_all("caf\u{e9}\n".as_bytes())?;
        Ok(())
    })?;
    let stored = fx.store.object(&object("gcloud://bucket/enc.txt")).unwrap();
    assert_eq!(&stored[..], "caf\u{e9}\n".as_bytes());
    Ok(())
}

#[test]
fn test_compressed_extensions_upload_bytes_as_written() -> Result<()> {
    let fx = Fixture::new();

    let mut out = fx.files.open_ctx("gcloud://bucket/data/out.json.gz", OpenMode::WRITE_BINARY, None)?;
    out.write_all(b"{\"a\":1}\n")?;
    out.close()?;
    let stored = fx.store.object(&object("gcloud://bucket/data/out.json.gz")).unwrap();
    assert_eq!(&stored[..], b"{\"a\":1}\n");

    // Already-compressed payloads are not compressed a second time.
    let payload = gzip(b"compressed payload\n");
    let mut out = fx.files.open_ctx("gcloud://bucket/d.json.gz", OpenMode::WRITE_BINARY, None)?;
    out.write_all(&payload)?;
    out.close()?;
    let stored = fx.store.object(&object("gcloud://bucket/d.json.gz")).unwrap();
    assert_eq!(&stored[..], &payload[..]);

    // And read back through the cache, decoded.
    let mut text = String::new();
    fx.files
        .open_ctx("gcloud://bucket/d.json.gz", OpenMode::READ, None)?
        .read_to_string(&mut text)?;
    assert_eq!(text, "compressed payload\n");

    let mut out = fx.files.open_ctx("gcloud://bucket/raw.bz2", OpenMode::WRITE_BINARY, None)?;
    out.write_all(b"BZh")?;
    out.close()?;
    assert_eq!(fx.store.object(&object("gcloud://bucket/raw.bz2")).as_deref(), Some(&b"BZh"[..]));
    Ok(())
}

#[test]
fn test_unsupported_remote_writes_fail_before_writing() {
    let fx = Fixture::new();

    for mode in [OpenMode::APPEND, OpenMode::parse("ab").unwrap()] {
        let err = fx.files.open_ctx("gcloud://bucket/a.txt", mode, None).err().unwrap();
        assert!(matches!(err, CacheError::Unsupported(_)), "{mode}: {err}");
    }
    let err = fx
        .files
        .open_ctx("gcloud://bucket/a.txt", OpenMode::WRITE, Some("latin-1"))
        .err()
        .unwrap();
    assert!(matches!(err, CacheError::Unsupported(_)));
    assert_eq!(fx.store.upload_count(), 0);
}

#[test]
fn test_missing_container_fails_at_close() -> Result<()> {
    let fx = Fixture::new();
    let mut out = fx.files.open_ctx("gcloud://nobucket/a.txt", OpenMode::WRITE, None)?;
    out.write_all(b"data")?;
    let err = out.close().unwrap_err();
    assert!(err.is_not_found(), "{err}");
    Ok(())
}

/// Store that records the source path of each upload and optionally fails it.
#[derive(Default)]
struct RecordingStore {
    fail: bool,
    seen: Mutex<Option<PathBuf>>,
}

impl ObjectStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn resolve(&self, _: &ObjectRef) -> meridian::Result<Option<ObjectMetadata>> {
        Ok(None)
    }

    fn download(&self, r: &ObjectRef, _: &Path) -> meridian::Result<()> {
        Err(CacheError::NotFound(r.to_string()))
    }

    fn upload(&self, r: &ObjectRef, source: &Path, _: bool) -> meridian::Result<()> {
        assert!(source.exists());
        *self.seen.lock().unwrap() = Some(source.to_path_buf());
        if self.fail {
            return Err(CacheError::transfer(r.to_string(), "connection reset"));
        }
        Ok(())
    }
}

#[test]
fn test_temp_file_is_removed_after_close() -> Result<()> {
    let store = Arc::new(RecordingStore::default());
    let mut writer = UploadOnClose::create(
        object("gcloud://bucket/x.txt"),
        store.clone(),
        OpenMode::WRITE,
        None,
    )?;
    writer.write_all(b"payload")?;
    assert_eq!(writer.bytes_written(), 7);
    writer.close()?;

    let temp = store.seen.lock().unwrap().clone().unwrap();
    assert!(temp.file_name().unwrap().to_string_lossy().ends_with(".txt"));
    assert!(!temp.exists(), "temp file {} left behind", temp.display());
    Ok(())
}

#[test]
fn test_upload_failure_propagates_and_cleans_up() -> Result<()> {
    let store = Arc::new(RecordingStore {
        fail: true,
        ..Default::default()
    });
    let mut writer = UploadOnClose::create(
        object("gcloud://bucket/f.txt"),
        store.clone(),
        OpenMode::WRITE_BINARY,
        None,
    )?;
    writer.write_all(b"bytes")?;

    let err = FileHandle::Upload(writer).close().unwrap_err();
    assert!(err.is_transfer(), "{err}");

    let temp = store.seen.lock().unwrap().clone().unwrap();
    assert!(!temp.exists(), "temp file {} left behind", temp.display());
    Ok(())
}
