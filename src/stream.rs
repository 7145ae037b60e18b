// src/stream.rs
//
// Open modes, URI classification and the handle type returned to callers.

use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::codec::{Codec, Reader, Writer};
use crate::error::{CacheError, Result};
use crate::object_ref::{scheme_of, ObjectRef};
use crate::scoped_writer::UploadOnClose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Append,
}

/// Access direction plus the text/binary flag, parsed from the familiar
/// mode strings: `r`, `rb`, `rt`, `w`, `wb`, `wt`, `a`, `ab`, `at`.
///
/// Text and binary streams carry the same bytes; text mode only admits an
/// encoding argument (see [`check_encoding`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub access: Access,
    pub binary: bool,
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode { access: Access::Read, binary: false };
    pub const READ_BINARY: OpenMode = OpenMode { access: Access::Read, binary: true };
    pub const WRITE: OpenMode = OpenMode { access: Access::Write, binary: false };
    pub const WRITE_BINARY: OpenMode = OpenMode { access: Access::Write, binary: true };
    pub const APPEND: OpenMode = OpenMode { access: Access::Append, binary: false };

    pub fn parse(mode: &str) -> Result<Self> {
        let mut access = None;
        let mut binary = None;
        for c in mode.chars() {
            match c {
                'r' | 'w' | 'a' if access.is_none() => {
                    access = Some(match c {
                        'r' => Access::Read,
                        'w' => Access::Write,
                        _ => Access::Append,
                    });
                }
                'b' | 't' if binary.is_none() => binary = Some(c == 'b'),
                _ => {
                    return Err(CacheError::Unsupported(format!("open mode {:?}", mode)));
                }
            }
        }
        let access =
            access.ok_or_else(|| CacheError::Unsupported(format!("open mode {:?}", mode)))?;
        Ok(Self {
            access,
            binary: binary.unwrap_or(false),
        })
    }

    pub fn is_read(&self) -> bool {
        self.access == Access::Read
    }
}

impl FromStr for OpenMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        OpenMode::parse(s)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = match self.access {
            Access::Read => "r",
            Access::Write => "w",
            Access::Append => "a",
        };
        write!(f, "{}{}", access, if self.binary { "b" } else { "t" })
    }
}

/// Streams are UTF-8 when read as text; other encodings are refused at open
/// time, as is any encoding on a binary stream.
pub fn check_encoding(mode: OpenMode, encoding: Option<&str>) -> Result<()> {
    let Some(label) = encoding else {
        return Ok(());
    };
    if mode.binary {
        return Err(CacheError::Unsupported(format!(
            "binary mode does not take an encoding (got {:?})",
            label
        )));
    }
    match label.to_ascii_lowercase().replace('_', "-").as_str() {
        "utf-8" | "utf8" | "ascii" | "us-ascii" => Ok(()),
        other => Err(CacheError::Unsupported(format!("text encoding {:?}", other))),
    }
}

/// Where an open target lives, decided once per open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(ObjectRef),
}

impl Location {
    /// Only `remote_scheme` designates a remote object; `file://` is stripped;
    /// anything else is taken as a local path.
    pub fn classify(target: &str, remote_scheme: &str) -> Result<Self> {
        match scheme_of(target) {
            Some(scheme) if scheme.eq_ignore_ascii_case(remote_scheme) => {
                Ok(Location::Remote(ObjectRef::parse(target)?))
            }
            Some(scheme) if scheme == "file" => {
                Ok(Location::Local(PathBuf::from(&target["file://".len()..])))
            }
            _ => Ok(Location::Local(PathBuf::from(target))),
        }
    }

    pub fn codec(&self) -> Codec {
        match self {
            Location::Local(path) => Codec::from_path(path),
            Location::Remote(r) => Codec::from_name(r.key()),
        }
    }
}

/// What [`crate::FileCache::open_ctx`] hands out.
///
/// Call [`FileHandle::close`] when done: it finishes encoders and, for a
/// remote destination, uploads. Dropping an `Upload` handle without closing
/// discards the written data and never touches the remote object.
pub enum FileHandle {
    Read(Reader),
    Write(Writer),
    Upload(UploadOnClose),
}

impl FileHandle {
    pub fn open_local(
        path: &Path,
        mode: OpenMode,
        encoding: Option<&str>,
        bzip2_command: &str,
    ) -> Result<Self> {
        check_encoding(mode, encoding)?;
        let codec = Codec::from_path(path);
        match mode.access {
            Access::Read => Ok(FileHandle::Read(Reader::open(path, codec, bzip2_command)?)),
            Access::Write => Ok(FileHandle::Write(Writer::create(path, codec, false)?)),
            Access::Append => Ok(FileHandle::Write(Writer::create(path, codec, true)?)),
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, FileHandle::Upload(_))
    }

    pub fn close(self) -> Result<()> {
        match self {
            FileHandle::Read(_) => Ok(()),
            FileHandle::Write(w) => Ok(w.finish()?),
            FileHandle::Upload(u) => u.close(),
        }
    }
}

fn wrong_direction(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("handle is not open for {}", what))
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileHandle::Read(r) => r.read(buf),
            _ => Err(wrong_direction("reading")),
        }
    }
}

impl BufRead for FileHandle {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            FileHandle::Read(r) => r.fill_buf(),
            _ => Err(wrong_direction("reading")),
        }
    }

    fn consume(&mut self, amt: usize) {
        if let FileHandle::Read(r) = self {
            r.consume(amt);
        }
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileHandle::Write(w) => w.write(buf),
            FileHandle::Upload(u) => u.write(buf),
            FileHandle::Read(_) => Err(wrong_direction("writing")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileHandle::Write(w) => w.flush(),
            FileHandle::Upload(u) => u.flush(),
            FileHandle::Read(_) => Err(wrong_direction("writing")),
        }
    }
}
