// src/object_ref.rs
//! Remote object references: `scheme://container/key`.
//!
//! Parsing is pure. The flattened name derived from a reference is the
//! on-disk name of its cache entry, so [`ObjectRef::flattened_name`] is a
//! persisted layout that other tooling reads; keep it stable.

use std::fmt;
use std::str::FromStr;

use crate::constants::SCHEME_DELIMITER;
use crate::error::{CacheError, Result};

/// A parsed `(scheme, container, key)` triple. Container and key are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    scheme: String,
    container: String,
    key: String,
}

impl ObjectRef {
    /// Split `uri` on `://`, then split the rest on the first `/`.
    ///
    /// ```
    /// use meridian::ObjectRef;
    ///
    /// let r = ObjectRef::parse("gcloud://bucket/data/out.json").unwrap();
    /// assert_eq!(r.container(), "bucket");
    /// assert_eq!(r.key(), "data/out.json");
    /// assert_eq!(r.to_string(), "gcloud://bucket/data/out.json");
    /// ```
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once(SCHEME_DELIMITER)
            .ok_or_else(|| CacheError::MalformedReference(format!("missing scheme: {uri}")))?;
        if scheme.is_empty() {
            return Err(CacheError::MalformedReference(format!("empty scheme: {uri}")));
        }

        let (container, key) = rest.split_once('/').ok_or_else(|| {
            CacheError::MalformedReference(format!("missing container separator: {uri}"))
        })?;
        if container.is_empty() || key.is_empty() {
            return Err(CacheError::MalformedReference(format!(
                "empty container or key: {uri}"
            )));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            container: container.to_string(),
            key: key.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `<container>-<key with every '/' replaced by '-'>`.
    pub fn flattened_name(&self) -> String {
        format!("{}-{}", self.container, self.key.replace('/', "-"))
    }

    /// Last extension of the key, lowercased (`"gz"` for `a/b.json.gz`).
    pub fn extension(&self) -> Option<String> {
        let name = self.key.rsplit('/').next()?;
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}/{}", self.scheme, SCHEME_DELIMITER, self.container, self.key)
    }
}

impl FromStr for ObjectRef {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        ObjectRef::parse(s)
    }
}

/// Whether `s` carries a scheme delimiter at all.
pub fn is_uri(s: &str) -> bool {
    s.contains(SCHEME_DELIMITER)
}

/// Scheme of `s`, lowercased, if it has one.
pub fn scheme_of(s: &str) -> Option<String> {
    s.split_once(SCHEME_DELIMITER)
        .map(|(scheme, _)| scheme.to_lowercase())
}
