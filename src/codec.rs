// src/codec.rs
//
// Extension-selected stream codecs.
//
// `.gz`  -> flate2 gzip in both directions (multi-member on read, so appended
//           members decode as one stream)
// `.bz2` -> read-only, decoded by an external program fed the file on stdin
// other  -> plain buffered file I/O

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use crate::constants::DEFAULT_STREAM_BUFFER_SIZE;
use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Plain,
    Gzip,
    Bzip2,
}

impl Codec {
    /// Pick a codec from the last extension of `name` (case-insensitive).
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".gz") {
            Codec::Gzip
        } else if lower.ends_with(".bz2") {
            Codec::Bzip2
        } else {
            Codec::Plain
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .map(|n| Self::from_name(&n.to_string_lossy()))
            .unwrap_or(Codec::Plain)
    }

    pub fn supports_write(self) -> bool {
        !matches!(self, Codec::Bzip2)
    }
}

// ============================================================================
// Read side
// ============================================================================

/// Decoded byte stream over a local file.
pub enum Reader {
    Plain(BufReader<File>),
    Gzip(BufReader<MultiGzDecoder<File>>),
    Bzip2(Bzip2Reader),
}

impl Reader {
    pub fn open(path: &Path, codec: Codec, bzip2_command: &str) -> Result<Self> {
        Ok(match codec {
            Codec::Plain => Reader::Plain(BufReader::with_capacity(
                DEFAULT_STREAM_BUFFER_SIZE,
                File::open(path)?,
            )),
            Codec::Gzip => Reader::Gzip(BufReader::with_capacity(
                DEFAULT_STREAM_BUFFER_SIZE,
                MultiGzDecoder::new(File::open(path)?),
            )),
            Codec::Bzip2 => Reader::Bzip2(Bzip2Reader::spawn(path, bzip2_command)?),
        })
    }

    pub fn codec(&self) -> Codec {
        match self {
            Reader::Plain(_) => Codec::Plain,
            Reader::Gzip(_) => Codec::Gzip,
            Reader::Bzip2(_) => Codec::Bzip2,
        }
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Reader::Plain(r) => r.read(buf),
            Reader::Gzip(r) => r.read(buf),
            Reader::Bzip2(r) => r.read(buf),
        }
    }
}

impl BufRead for Reader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Reader::Plain(r) => r.fill_buf(),
            Reader::Gzip(r) => r.fill_buf(),
            Reader::Bzip2(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Reader::Plain(r) => r.consume(amt),
            Reader::Gzip(r) => r.consume(amt),
            Reader::Bzip2(r) => r.consume(amt),
        }
    }
}

/// Output of an external bzip2 decoder.
///
/// The child process belongs to this reader: at end of stream its exit status
/// is collected and a failure surfaces as a read error; dropping the reader
/// early kills and reaps it.
pub struct Bzip2Reader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    path: PathBuf,
    finished: bool,
}

impl Bzip2Reader {
    /// `command` is split on whitespace into program and arguments; the file
    /// is connected to the program's stdin.
    pub fn spawn(path: &Path, command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| CacheError::Unsupported("empty bzip2 decoder command".to_string()))?;

        let input = File::open(path)?;
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                CacheError::Unsupported(format!("cannot start bzip2 decoder `{}`: {}", program, e))
            })?;
        debug!("Spawned `{}` (pid {}) for {}", command, child.id(), path.display());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("bzip2 decoder has no stdout"))?;
        Ok(Self {
            child,
            stdout: BufReader::with_capacity(DEFAULT_STREAM_BUFFER_SIZE, stdout),
            path: path.to_path_buf(),
            finished: false,
        })
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let status = self.child.wait()?;
        if !status.success() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bzip2 decoder failed on {}: {}", self.path.display(), status),
            ));
        }
        Ok(())
    }
}

impl Read for Bzip2Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.finish()?;
        }
        Ok(n)
    }
}

impl BufRead for Bzip2Reader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.stdout.fill_buf()?.is_empty() {
            self.finish()?;
        }
        self.stdout.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.stdout.consume(amt)
    }
}

impl Drop for Bzip2Reader {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Closed before end of stream: the decoder may be blocked on a full pipe.
        if let Err(e) = self.child.kill() {
            if e.kind() != io::ErrorKind::InvalidInput {
                warn!("Failed to kill bzip2 decoder for {}: {}", self.path.display(), e);
            }
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap bzip2 decoder for {}: {}", self.path.display(), e);
        }
    }
}

// ============================================================================
// Write side
// ============================================================================

/// Encoding byte sink over a local file. Call [`Writer::finish`] to write
/// trailers and flush; dropping flushes on a best-effort basis only.
pub enum Writer {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Writer {
    pub fn create(path: &Path, codec: Codec, append: bool) -> Result<Self> {
        if !codec.supports_write() {
            return Err(CacheError::Unsupported(format!(
                "{:?} streams are read-only: {}",
                codec,
                path.display()
            )));
        }
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };
        Ok(Self::from_file(file, codec))
    }

    pub(crate) fn from_file(file: File, codec: Codec) -> Self {
        let buffered = BufWriter::with_capacity(DEFAULT_STREAM_BUFFER_SIZE, file);
        match codec {
            Codec::Gzip => Writer::Gzip(GzEncoder::new(buffered, Compression::default())),
            _ => Writer::Plain(buffered),
        }
    }

    pub fn codec(&self) -> Codec {
        match self {
            Writer::Plain(_) => Codec::Plain,
            Writer::Gzip(_) => Codec::Gzip,
        }
    }

    /// Complete the encoded stream and flush it to the file.
    pub fn finish(self) -> io::Result<()> {
        let buffered = match self {
            Writer::Plain(w) => w,
            Writer::Gzip(enc) => enc.finish()?,
        };
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(w) => w.write(buf),
            Writer::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(w) => w.flush(),
            Writer::Gzip(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_codec_from_name() {
        assert_eq!(Codec::from_name("a/b/data.json.gz"), Codec::Gzip);
        assert_eq!(Codec::from_name("DATA.BZ2"), Codec::Bzip2);
        assert_eq!(Codec::from_name("data.json"), Codec::Plain);
        assert_eq!(Codec::from_name("gz"), Codec::Plain);
        assert_eq!(Codec::from_path(Path::new("/tmp/x.gz")), Codec::Gzip);
    }

    #[test]
    fn test_bzip2_is_read_only() {
        let dir = TempDir::new().unwrap();
        let err = Writer::create(&dir.path().join("out.bz2"), Codec::Bzip2, false)
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::Unsupported(_)));
        assert!(!dir.path().join("out.bz2").exists());
    }

    #[test]
    fn test_gzip_append_reads_as_one_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.gz");

        let mut w = Writer::create(&path, Codec::Gzip, false).unwrap();
        w.write_all(b"first\n").unwrap();
        w.finish().unwrap();
        let mut w = Writer::create(&path, Codec::Gzip, true).unwrap();
        w.write_all(b"second\n").unwrap();
        w.finish().unwrap();

        let mut out = String::new();
        Reader::open(&path, Codec::Gzip, "bzcat")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "first\nsecond\n");
    }

    #[test]
    fn test_missing_decoder_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.bz2");
        std::fs::write(&path, b"not really bzip2").unwrap();
        let err = Reader::open(&path, Codec::Bzip2, "definitely-not-a-real-decoder-xyz")
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::Unsupported(_)));
    }
}
