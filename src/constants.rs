// src/constants.rs
//
// Centralized constants for meridian to avoid hardcoded values throughout the codebase

/// Default location of the local mirror of remote objects
pub const DEFAULT_CACHE_DIR: &str = "/data/cache/";

/// URI scheme that designates a remote object; anything else is a local path
pub const DEFAULT_REMOTE_SCHEME: &str = "gcloud";

/// Separator between the scheme and the rest of a URI
pub const SCHEME_DELIMITER: &str = "://";

/// External decoder used for `.bz2` reads (streams the decoded payload to stdout)
pub const DEFAULT_BZIP2_COMMAND: &str = "bzcat";

/// Suffix of in-flight download files inside the cache directory
pub const TEMP_SUFFIX: &str = ".tmp";

/// Bytes per megabyte, used when logging upload payload sizes
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Buffer size for plain and decoded streams (128 KB)
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 128 * 1024;

// ============================================================================
// Environment Variables
// ============================================================================

/// Environment variable overriding the cache root directory
pub const ENV_CACHE_DIR: &str = "MERIDIAN_CACHE_DIR";

/// Environment variable overriding the remote URI scheme
pub const ENV_REMOTE_SCHEME: &str = "MERIDIAN_REMOTE_SCHEME";

/// Environment variable overriding the bzip2 decoder command
pub const ENV_BZIP2_COMMAND: &str = "MERIDIAN_BZIP2_CMD";

/// Environment variable overriding the number of GCS runtime worker threads
pub const ENV_RT_THREADS: &str = "MERIDIAN_RT_THREADS";

/// Full GCS endpoint URL (e.g. http://localhost:4443) for emulators and proxies
pub const ENV_GCS_ENDPOINT_URL: &str = "GCS_ENDPOINT_URL";

/// GCS emulator convention: host:port, http:// prepended if missing
pub const ENV_STORAGE_EMULATOR_HOST: &str = "STORAGE_EMULATOR_HOST";

/// Default worker threads for the GCS runtime when no override is set
pub const DEFAULT_RT_THREADS: usize = 2;
