// src/bin/cli.rs
//
//! CLI over the object cache: `fetch`, `path`, `cat` and `put`.
//!
//! Examples:
//! ```bash
//! meridian-cli fetch gcloud://bucket/data/train.json.gz    # mirror, print local path
//! meridian-cli path  gcloud://bucket/data/train.json.gz    # cache path, no network
//! meridian-cli cat   gcloud://bucket/data/train.json.gz    # decoded content to stdout
//! meridian-cli put   out.json gcloud://bucket/data/out.json
//!
//! # Local directory standing in for the bucket store
//! meridian-cli --store-dir /srv/buckets --cache-dir /tmp/mirror cat gcloud://bucket/a.txt
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meridian::{
    CacheConfig, DirectoryStore, FileCache, GcsStore, ObjectRef, ObjectStore, OpenMode,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Cache directory (overrides MERIDIAN_CACHE_DIR).
    #[arg(long = "cache-dir", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Serve objects from this directory (one sub-directory per bucket)
    /// instead of Google Cloud Storage.
    #[arg(long = "store-dir", value_name = "DIR")]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror an object if needed and print its local path.
    Fetch {
        /// Object URI, e.g. gcloud://bucket/key
        uri: String,
    },

    /// Print the cache path an object maps to, without fetching it.
    Path {
        uri: String,
    },

    /// Write the decoded content of a local file or object to stdout.
    Cat {
        target: String,
    },

    /// Copy a local file's bytes as-is to a destination, uploading remote ones
    /// on completion.
    Put {
        local: PathBuf,
        destination: String,
    },
}

fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Capture `log` records from dependencies
    tracing_log::LogTracer::init().ok();

    let mut config = CacheConfig::from_env();
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_root(dir);
    }
    let store: Arc<dyn ObjectStore> = match &cli.store_dir {
        Some(dir) => Arc::new(DirectoryStore::new(dir)),
        None => Arc::new(GcsStore::new().context("failed to set up the GCS client")?),
    };
    let files = FileCache::new(config, store);

    match cli.cmd {
        Command::Fetch { uri } => {
            let reference = ObjectRef::parse(&uri)?;
            let t0 = Instant::now();
            let path = files.ensure_fresh(&reference)?;
            info!("{} ready in {:.2?}", reference, t0.elapsed());
            safe_println!("{}", path.display());
        }

        Command::Path { uri } => {
            safe_println!("{}", files.cache_path(&uri)?.display());
        }

        Command::Cat { target } => {
            let mut input = files.open_ctx(&target, OpenMode::READ_BINARY, None)?;
            let mut stdout = io::stdout().lock();
            match io::copy(&mut input, &mut stdout) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::BrokenPipe => std::process::exit(0),
                Err(e) => return Err(e).with_context(|| format!("reading {}", target)),
            }
            input.close()?;
        }

        Command::Put { local, destination } => {
            let t0 = Instant::now();
            let mut input = std::fs::File::open(&local)
                .with_context(|| format!("opening {}", local.display()))?;
            let copied = files.with_writer(&destination, OpenMode::WRITE_BINARY, None, |out| {
                Ok(io::copy(&mut input, out)?)
            })?;
            safe_println!(
                "Wrote {} bytes to {} in {:.2?}",
                copied,
                destination,
                t0.elapsed()
            );
        }
    }

    Ok(())
}
