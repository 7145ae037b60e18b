// src/scoped_writer.rs
//
// Writer for remote destinations: bytes go to a local temporary file and are
// uploaded as a whole object when the writer is closed. The object receives
// exactly the bytes written; no codec is applied on the way out, whatever the
// destination's extension.

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use tempfile::TempPath;
use tracing::{debug, info};

use crate::codec::{Codec, Writer};
use crate::constants::BYTES_PER_MB;
use crate::error::{CacheError, Result};
use crate::object_ref::ObjectRef;
use crate::object_store::ObjectStore;
use crate::stream::{check_encoding, Access, OpenMode};

/// Upload-on-close writer for one remote object.
///
/// - [`UploadOnClose::close`]: finish, log the payload size, upload (creating
///   the object if needed), delete the temp file. The temp file is deleted even
///   when the upload fails, and the upload error is returned.
/// - drop without `close`: the temp file is deleted and nothing is uploaded.
pub struct UploadOnClose {
    destination: ObjectRef,
    store: Arc<dyn ObjectStore>,
    writer: Writer,
    temp: TempPath,
    mode: OpenMode,
    bytes_written: u64,
}

impl UploadOnClose {
    /// Append mode is refused here, before any write.
    pub fn create(
        destination: ObjectRef,
        store: Arc<dyn ObjectStore>,
        mode: OpenMode,
        encoding: Option<&str>,
    ) -> Result<Self> {
        if mode.access != Access::Write {
            return Err(CacheError::Unsupported(format!(
                "remote objects are written whole; mode {} on {}",
                mode, destination
            )));
        }
        check_encoding(mode, encoding)?;

        let suffix = destination.extension().map(|e| format!(".{}", e)).unwrap_or_default();
        let (file, temp) = tempfile::Builder::new()
            .prefix("meridian-upload-")
            .suffix(&suffix)
            .tempfile()?
            .into_parts();
        debug!("Buffering {} in {}", destination, temp.display());

        Ok(Self {
            destination,
            store,
            writer: Writer::from_file(file, Codec::Plain),
            temp,
            mode,
            bytes_written: 0,
        })
    }

    pub fn destination(&self) -> &ObjectRef {
        &self.destination
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn close(self) -> Result<()> {
        let Self {
            destination,
            store,
            writer,
            temp,
            ..
        } = self;

        // An early return drops `temp`, which deletes the file.
        writer.finish()?;
        let size = fs::metadata(&temp)?.len();
        info!(
            "Uploading {} ({:.3} MB)",
            destination,
            size as f64 / BYTES_PER_MB
        );

        let uploaded = store.upload(&destination, &temp, true);
        let removed = temp.close();
        uploaded?;
        removed?;
        Ok(())
    }
}

impl Write for UploadOnClose {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
