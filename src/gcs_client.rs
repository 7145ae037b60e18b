// src/gcs_client.rs
//
// Google Cloud Storage backend using the gcloud-storage crate.
// Blocking facade over the async client: the store owns a small tokio runtime
// and a lazily-initialised client with Application Default Credentials (ADC).

use std::future::Future;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::time::SystemTime;

use anyhow::anyhow;
use futures::StreamExt;
use gcloud_storage::client::{Client, ClientConfig};
use gcloud_storage::http::buckets::get::GetBucketRequest;
use gcloud_storage::http::objects::download::Range;
use gcloud_storage::http::objects::get::GetObjectRequest;
use gcloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use tokio::io::AsyncWriteExt;
use tokio::runtime::{Builder as TokioBuilder, Runtime};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::constants::{
    DEFAULT_RT_THREADS, ENV_GCS_ENDPOINT_URL, ENV_RT_THREADS, ENV_STORAGE_EMULATOR_HOST,
};
use crate::error::{CacheError, Result};
use crate::object_ref::ObjectRef;
use crate::object_store::{ObjectMetadata, ObjectStore};

/// GCS-backed [`ObjectStore`].
///
/// The client is created on first use, exactly once even when several threads
/// race on the first call, and lives as long as the store. Share the store
/// through an `Arc` rather than building several.
///
/// Authentication follows the standard ADC chain:
/// 1. GOOGLE_APPLICATION_CREDENTIALS environment variable (service account JSON)
/// 2. GCE/GKE metadata server
/// 3. gcloud CLI credentials (~/.config/gcloud/application_default_credentials.json)
///
/// `GCS_ENDPOINT_URL` or `STORAGE_EMULATOR_HOST` switch to a custom endpoint
/// with anonymous auth (fake-gcs-server and similar emulators).
///
/// Dropping the store is safe from inside another tokio runtime: its own
/// runtime is shut down in the background rather than joined.
pub struct GcsStore {
    // Always `Some` until `drop`.
    runtime: Option<Runtime>,
    client: Arc<OnceCell<Arc<Client>>>,
}

impl GcsStore {
    pub fn new() -> Result<Self> {
        let threads = runtime_threads();
        debug!("Creating GCS runtime with {} worker threads", threads);
        let runtime = TokioBuilder::new_multi_thread()
            .enable_io()
            .enable_time()
            .worker_threads(threads)
            .thread_name("meridian-gcs")
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            client: Arc::new(OnceCell::new()),
        })
    }

    /// Run `fut` on the store's runtime and block the current thread until it
    /// completes. Spawning instead of `block_on` keeps this usable from
    /// threads that are themselves inside a tokio runtime.
    fn run<F, T>(&self, uri: &ObjectRef, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| CacheError::transfer(uri.to_string(), "GCS runtime already shut down"))?;
        let (tx, rx) = mpsc::channel();
        runtime.spawn(async move {
            let _ = tx.send(fut.await);
        });
        rx.recv()
            .map_err(|_| CacheError::transfer(uri.to_string(), "GCS runtime task crashed"))?
    }
}

impl Drop for GcsStore {
    fn drop(&mut self) {
        // A plain `Runtime` drop blocks, which panics inside an async context.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn runtime_threads() -> usize {
    std::env::var(ENV_RT_THREADS)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_RT_THREADS)
}

async fn shared_client(cell: &OnceCell<Arc<Client>>) -> anyhow::Result<Arc<Client>> {
    let client = cell
        .get_or_try_init(|| async {
            let config = if let Some(endpoint) = resolve_gcs_endpoint() {
                info!("Using custom GCS endpoint: {}", endpoint);
                ClientConfig {
                    storage_endpoint: endpoint,
                    ..ClientConfig::default()
                }
                .anonymous()
            } else {
                debug!("Initializing GCS client with Application Default Credentials");
                ClientConfig::default()
                    .with_auth()
                    .await
                    .map_err(|e| anyhow!("Failed to initialize GCS authentication: {}", e))?
            };
            info!("GCS client initialized (cached for reuse)");
            Ok::<Arc<Client>, anyhow::Error>(Arc::new(Client::new(config)))
        })
        .await?;
    Ok(Arc::clone(client))
}

fn is_not_found(err: &gcloud_storage::http::Error) -> bool {
    matches!(err, gcloud_storage::http::Error::Response(resp) if resp.code == 404)
}

fn object_request(bucket: &str, object: &str) -> GetObjectRequest {
    GetObjectRequest {
        bucket: bucket.to_string(),
        object: object.to_string(),
        ..Default::default()
    }
}

async fn stat(client: &Client, reference: &ObjectRef) -> Result<Option<ObjectMetadata>> {
    let (bucket, object) = (reference.container(), reference.key());
    debug!("GCS STAT: bucket={}, object={}", bucket, object);

    match client.get_object(&object_request(bucket, object)).await {
        Ok(obj) => Ok(Some(ObjectMetadata {
            size: obj.size.max(0) as u64,
            created: obj.time_created.map(SystemTime::from),
            updated: obj.updated.map(SystemTime::from),
        })),
        Err(e) if is_not_found(&e) => {
            // Missing object and missing bucket both come back as 404; only
            // the latter is an error.
            let bucket_req = GetBucketRequest {
                bucket: bucket.to_string(),
                ..Default::default()
            };
            match client.get_bucket(&bucket_req).await {
                Ok(_) => Ok(None),
                Err(e) if is_not_found(&e) => {
                    Err(CacheError::NotFound(format!("bucket {}", bucket)))
                }
                Err(e) => Err(CacheError::transfer(reference.to_string(), e)),
            }
        }
        Err(e) => Err(CacheError::transfer(reference.to_string(), e)),
    }
}

impl ObjectStore for GcsStore {
    fn name(&self) -> &'static str {
        "gcs"
    }

    fn resolve(&self, reference: &ObjectRef) -> Result<Option<ObjectMetadata>> {
        let cell = Arc::clone(&self.client);
        let r = reference.clone();
        self.run(reference, async move {
            let client = shared_client(&cell)
                .await
                .map_err(|e| CacheError::transfer(r.to_string(), e))?;
            stat(&client, &r).await
        })
    }

    fn download(&self, reference: &ObjectRef, destination: &Path) -> Result<()> {
        let cell = Arc::clone(&self.client);
        let r = reference.clone();
        let dest = destination.to_path_buf();
        self.run(reference, async move {
            let uri = r.to_string();
            let client = shared_client(&cell)
                .await
                .map_err(|e| CacheError::transfer(uri.clone(), e))?;
            debug!("GCS GET: bucket={}, object={}", r.container(), r.key());

            let stream = client
                .download_streamed_object(&object_request(r.container(), r.key()), &Range::default())
                .await
                .map_err(|e| {
                    if is_not_found(&e) {
                        CacheError::NotFound(uri.clone())
                    } else {
                        CacheError::transfer(uri.clone(), e)
                    }
                })?;
            let mut stream = Box::pin(stream);

            let mut file = tokio::fs::File::create(&dest).await?;
            let mut total = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| CacheError::transfer(uri.clone(), e))?;
                total += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            file.sync_all().await?;

            debug!("GCS GET success: {} bytes", total);
            Ok(())
        })
    }

    fn upload(&self, reference: &ObjectRef, source: &Path, create_if_missing: bool) -> Result<()> {
        let cell = Arc::clone(&self.client);
        let r = reference.clone();
        let src = source.to_path_buf();
        self.run(reference, async move {
            let uri = r.to_string();
            let client = shared_client(&cell)
                .await
                .map_err(|e| CacheError::transfer(uri.clone(), e))?;

            // Surfaces a missing bucket as NotFound before any bytes move.
            let existing = stat(&client, &r).await?;
            if existing.is_none() && !create_if_missing {
                return Err(CacheError::NotFound(uri));
            }

            // Simple upload: the whole object is held in memory. Payloads here
            // are JSON/text artifacts; switch to a resumable upload if that
            // stops being true.
            let data = tokio::fs::read(&src).await?;
            debug!("GCS PUT: bucket={}, object={}, size={}", r.container(), r.key(), data.len());
            let size = data.len();
            let upload_type = UploadType::Simple(Media::new(r.key().to_string()));
            client
                .upload_object(
                    &UploadObjectRequest {
                        bucket: r.container().to_string(),
                        ..Default::default()
                    },
                    data,
                    &upload_type,
                )
                .await
                .map_err(|e| CacheError::transfer(uri.clone(), e))?;

            debug!("GCS PUT success: {} bytes", size);
            Ok(())
        })
    }
}

/// Resolves the GCS storage endpoint based on environment variables.
///
/// Returns a custom endpoint URL if `GCS_ENDPOINT_URL` or `STORAGE_EMULATOR_HOST`
/// is set, otherwise `None` (use the default GCS endpoint).
pub fn resolve_gcs_endpoint() -> Option<String> {
    std::env::var(ENV_GCS_ENDPOINT_URL)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| {
            std::env::var(ENV_STORAGE_EMULATOR_HOST)
                .ok()
                .filter(|v| !v.is_empty())
                .map(|host| {
                    if host.starts_with("http://") || host.starts_with("https://") {
                        host
                    } else {
                        format!("http://{}", host)
                    }
                })
        })
}
