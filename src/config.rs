// src/config.rs
//
// Runtime parameters for the cache layer, with env-var overrides.

use std::env;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_BZIP2_COMMAND, DEFAULT_CACHE_DIR, DEFAULT_REMOTE_SCHEME, ENV_BZIP2_COMMAND,
    ENV_CACHE_DIR, ENV_REMOTE_SCHEME,
};

/// Where remote objects are mirrored and how URIs are classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding flattened mirrors of remote objects.
    pub cache_root: PathBuf,
    /// The single scheme treated as remote (e.g. `gcloud` in `gcloud://bucket/key`).
    pub remote_scheme: String,
    /// Command spawned to decode `.bz2` files; the compressed file is fed on stdin.
    pub bzip2_command: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_DIR),
            remote_scheme: DEFAULT_REMOTE_SCHEME.to_string(),
            bzip2_command: DEFAULT_BZIP2_COMMAND.to_string(),
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `MERIDIAN_*` variables. A `.env` file in the
    /// working directory is loaded first; variables already set win.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut cfg = Self::default();
        if let Some(dir) = non_empty_var(ENV_CACHE_DIR) {
            cfg.cache_root = PathBuf::from(dir);
        }
        if let Some(scheme) = non_empty_var(ENV_REMOTE_SCHEME) {
            cfg.remote_scheme = scheme.to_lowercase();
        }
        if let Some(cmd) = non_empty_var(ENV_BZIP2_COMMAND) {
            cfg.bzip2_command = cmd;
        }
        cfg
    }

    pub fn with_cache_root(mut self, root: impl AsRef<Path>) -> Self {
        self.cache_root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_remote_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.remote_scheme = scheme.into().to_lowercase();
        self
    }

    pub fn with_bzip2_command(mut self, cmd: impl Into<String>) -> Self {
        self.bzip2_command = cmd.into();
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
