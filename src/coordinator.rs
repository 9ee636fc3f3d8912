/// Asset coordination
///
/// Keeps the blob store and the metadata store consistent across upload and
/// delete. The coordinator holds no per-call state; the only shared mutable
/// value is the lock-free id generator.

use crate::blob_store::{BlobClient, BlobError};
use crate::db::{ImageRecord, LocationRecord, MetadataStore, NewImage, StoreError};
use crate::error::{AssetError, AssetResult};
use crate::metrics;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What to do with a blob whose metadata write failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave the blob in place; log and count it
    #[default]
    Retain,
    /// Best-effort delete of the blob
    Compensate,
}

impl FromStr for OrphanPolicy {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" => Ok(OrphanPolicy::Retain),
            "compensate" | "delete" => Ok(OrphanPolicy::Compensate),
            other => Err(AssetError::Config(format!("Unknown orphan policy: {}", other))),
        }
    }
}

/// Generates `img_<unix-nanos>` ids, strictly increasing within the process
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(std::cmp::max(prev + 1, now))
            })
            .unwrap_or_else(|prev| prev);

        format!("img_{}", std::cmp::max(prev + 1, now))
    }
}

/// Upload input
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Caller-supplied id for idempotent retries; generated when absent
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub location: Option<LocationRecord>,
    pub data: Vec<u8>,
}

/// Blob file name: `<id>_<title>.jpg`, or `<id>.jpg` without a title
pub fn blob_name(id: &str, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        format!("{}.jpg", id)
    } else {
        let safe: String = title
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("{}_{}.jpg", id, safe)
    }
}

/// Orchestrates blob + metadata operations
pub struct AssetCoordinator {
    blobs: Arc<dyn BlobClient>,
    store: Arc<dyn MetadataStore>,
    orphan_policy: OrphanPolicy,
    ids: IdGenerator,
}

impl AssetCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobClient>,
        store: Arc<dyn MetadataStore>,
        orphan_policy: OrphanPolicy,
    ) -> Self {
        Self {
            blobs,
            store,
            orphan_policy,
            ids: IdGenerator::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Upload the blob, then persist metadata.
    ///
    /// No metadata is written unless the blob upload succeeded. A metadata
    /// failure after a successful upload is reported as `Persistence` and the
    /// blob is handled according to the orphan policy.
    pub async fn upload(&self, request: UploadRequest) -> AssetResult<ImageRecord> {
        if request.data.is_empty() {
            metrics::record_upload("invalid");
            return Err(AssetError::InvalidInput("image data is empty".to_string()));
        }
        if let Some(location) = &request.location {
            if let Err(msg) = location.check_coordinates() {
                metrics::record_upload("invalid");
                return Err(AssetError::InvalidInput(msg));
            }
        }

        let id = match request.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.ids.next_id(),
        };
        let name = blob_name(&id, &request.title);
        let size = request.data.len();

        let handle = match self.blobs.upload(&name, request.data).await {
            Ok(handle) => handle,
            Err(e) => {
                metrics::record_upload("upload_error");
                error!(id = %id, error = %e, "Blob upload failed");
                return Err(AssetError::Upload(e.to_string()));
            }
        };
        debug!(id = %id, handle = %handle, size, "Blob uploaded");

        let location = request.location.map(|mut location| {
            location.image_id = id.clone();
            location
        });
        let image = NewImage {
            id: id.clone(),
            title: request.title,
            description: request.description,
            blob_handle: handle.clone(),
            location,
        };

        let pending = PendingBlob {
            blobs: self.blobs.clone(),
            store: self.store.clone(),
            policy: self.orphan_policy,
            id: id.clone(),
            handle: handle.clone(),
            armed: true,
        };
        let written = self.store.create_image(&image).await;
        pending.settle();

        if let Err(e) = written {
            metrics::record_upload("persistence_error");
            error!(id = %id, handle = %handle, error = %e, "Metadata write failed after blob upload");
            handle_orphan(self.blobs.as_ref(), self.orphan_policy, &id, &handle).await;
            return Err(AssetError::Persistence(e.to_string()));
        }

        metrics::record_upload("success");
        info!(id = %id, handle = %handle, "Image uploaded");

        self.store.get_image(&id).await.map_err(|e| match e {
            StoreError::NotFound(msg) => AssetError::Persistence(format!("{} vanished after write", msg)),
            other => AssetError::Persistence(other.to_string()),
        })
    }

    /// Delete the blob, then the metadata.
    ///
    /// A blob that is already gone does not block the metadata delete, so a
    /// retry after a failed metadata delete converges.
    pub async fn delete(&self, id: &str) -> AssetResult<()> {
        let record = match self.store.get_image(id).await {
            Ok(record) => record,
            Err(e) => {
                let err = AssetError::from(e);
                metrics::record_delete(if matches!(err, AssetError::NotFound(_)) {
                    "not_found"
                } else {
                    "persistence_error"
                });
                return Err(err);
            }
        };

        if !record.blob_handle.is_empty() {
            match self.blobs.delete(&record.blob_handle).await {
                Ok(()) => {}
                Err(BlobError::NotFound(_)) => {
                    debug!(id = %id, handle = %record.blob_handle, "Blob already gone");
                }
                Err(e) => {
                    metrics::record_delete("upload_error");
                    error!(id = %id, handle = %record.blob_handle, error = %e, "Blob delete failed");
                    return Err(AssetError::Upload(e.to_string()));
                }
            }
        }

        if let Err(e) = self.store.delete_image(id).await {
            metrics::record_delete("persistence_error");
            error!(id = %id, error = %e, "Metadata delete failed after blob delete");
            return Err(match e {
                StoreError::NotFound(msg) => AssetError::NotFound(msg),
                other => AssetError::Persistence(other.to_string()),
            });
        }

        metrics::record_delete("success");
        info!(id = %id, "Image deleted");
        Ok(())
    }

    pub async fn get_image(&self, id: &str) -> AssetResult<ImageRecord> {
        Ok(self.store.get_image(id).await?)
    }

    pub async fn get_current_image(&self) -> AssetResult<ImageRecord> {
        Ok(self.store.get_current_image().await?)
    }

    pub async fn list_images(&self) -> AssetResult<Vec<ImageRecord>> {
        Ok(self.store.list_images().await?)
    }

    pub async fn count(&self) -> AssetResult<i64> {
        Ok(self.store.count().await?)
    }

    /// Bytes of an image's blob
    pub async fn image_data(&self, id: &str) -> AssetResult<(ImageRecord, Vec<u8>)> {
        let record = self.store.get_image(id).await?;
        let data = self.blobs.download(&record.blob_handle).await?;
        Ok((record, data))
    }
}

/// Apply the orphan policy to a blob whose metadata write did not finish
async fn handle_orphan(blobs: &dyn BlobClient, policy: OrphanPolicy, id: &str, handle: &str) {
    match policy {
        OrphanPolicy::Retain => {
            metrics::ORPHANED_BLOBS_TOTAL.inc();
            warn!(id = %id, handle = %handle, "Retaining orphaned blob");
        }
        OrphanPolicy::Compensate => match blobs.delete(handle).await {
            Ok(()) | Err(BlobError::NotFound(_)) => {
                info!(id = %id, handle = %handle, "Removed blob of failed upload");
            }
            Err(e) => {
                metrics::ORPHANED_BLOBS_TOTAL.inc();
                warn!(id = %id, handle = %handle, error = %e, "Compensating blob delete failed");
            }
        },
    }
}

/// An uploaded blob whose metadata write is in flight.
///
/// Dropped while still armed means the upload future was cancelled (request
/// deadline, client gone). The orphan policy then runs on a detached task,
/// unless the metadata commit landed before the cancellation.
struct PendingBlob {
    blobs: Arc<dyn BlobClient>,
    store: Arc<dyn MetadataStore>,
    policy: OrphanPolicy,
    id: String,
    handle: String,
    armed: bool,
}

impl PendingBlob {
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        metrics::record_upload("cancelled");
        let id = std::mem::take(&mut self.id);
        let handle = std::mem::take(&mut self.handle);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            metrics::ORPHANED_BLOBS_TOTAL.inc();
            warn!(id = %id, handle = %handle, "Upload cancelled outside a runtime, retaining blob");
            return;
        };
        warn!(id = %id, handle = %handle, "Upload cancelled after blob write");

        let blobs = self.blobs.clone();
        let store = self.store.clone();
        let policy = self.policy;
        runtime.spawn(async move {
            if let Ok(record) = store.get_image(&id).await {
                if record.blob_handle == handle {
                    debug!(id = %id, handle = %handle, "Metadata committed before cancellation");
                    return;
                }
            }
            handle_orphan(blobs.as_ref(), policy, &id, &handle).await;
        });
    }
}
