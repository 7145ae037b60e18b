// src/json.rs
//
// JSON convenience readers/writers. They only read lines, write and close
// handles from `FileCache::open_ctx`, so local paths and remote objects
// behave the same.

use std::io::{BufRead, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::FileCache;
use crate::error::Result;
use crate::stream::OpenMode;

/// One value per non-blank line.
pub fn read_json_lines<T: DeserializeOwned>(files: &FileCache, target: &str) -> Result<Vec<T>> {
    let handle = files.open_ctx(target, OpenMode::READ, None)?;
    let mut items = Vec::new();
    for line in handle.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line).map_err(std::io::Error::from)?);
    }
    Ok(items)
}

pub fn write_json_lines<I>(files: &FileCache, target: &str, items: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    files.with_writer(target, OpenMode::WRITE, None, |out| {
        for item in items {
            serde_json::to_writer(&mut *out, &item).map_err(std::io::Error::from)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    })
}

pub fn read_json<T: DeserializeOwned>(files: &FileCache, target: &str) -> Result<T> {
    let mut handle = files.open_ctx(target, OpenMode::READ, None)?;
    let mut text = String::new();
    handle.read_to_string(&mut text)?;
    Ok(serde_json::from_str(&text).map_err(std::io::Error::from)?)
}

pub fn write_json<T: Serialize + ?Sized>(files: &FileCache, target: &str, value: &T) -> Result<()> {
    files.with_writer(target, OpenMode::WRITE, None, |out| {
        serde_json::to_writer(&mut *out, value).map_err(std::io::Error::from)?;
        Ok(())
    })
}
