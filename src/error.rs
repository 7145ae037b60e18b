// src/error.rs
//
// Error taxonomy shared by the parser, the stores, the synchronizer and the
// stream layer. Nothing in the crate logs-and-swallows one of these.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum CacheError {
    /// URI without `://`, without a `/` after the container, or with an empty part.
    #[error("malformed object reference: {0}")]
    MalformedReference(String),

    /// Remote object or container absent where it is required.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or backend failure while moving bytes. Never retried here.
    #[error("transfer failed for {uri}: {source}")]
    Transfer {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// Requested mode/codec/encoding combination cannot be served.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    pub fn transfer(uri: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CacheError::Transfer {
            uri: uri.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Transfer-class failure: backend errors plus local I/O errors.
    pub fn is_transfer(&self) -> bool {
        matches!(self, CacheError::Transfer { .. } | CacheError::Io(_))
    }
}

// Stream adapters (Read/Write impls) can only surface io::Error.
impl From<CacheError> for std::io::Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Io(e) => e,
            CacheError::NotFound(what) => {
                std::io::Error::new(std::io::ErrorKind::NotFound, what)
            }
            CacheError::Unsupported(what) => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, what)
            }
            other => std::io::Error::other(other),
        }
    }
}
