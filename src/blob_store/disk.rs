/// Local-directory blob client
use crate::blob_store::{BlobClient, BlobError, BlobResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Disk blob client
///
/// Handles are random UUIDs. Files are sharded into subdirectories by the
/// first two characters of the handle so no single directory grows unbounded.
#[derive(Clone)]
pub struct DiskBlobClient {
    base_path: PathBuf,
}

impl DiskBlobClient {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// {base}/{first2chars}/{handle}
    fn blob_path(&self, handle: &str) -> BlobResult<PathBuf> {
        if handle.is_empty()
            || handle.contains(['/', '\\'])
            || handle.contains("..")
        {
            return Err(BlobError::NotFound(handle.to_string()));
        }

        let shard = handle.get(0..2).unwrap_or("_");
        Ok(self.base_path.join(shard).join(handle))
    }
}

#[async_trait]
impl BlobClient for DiskBlobClient {
    async fn upload(&self, name: &str, data: Vec<u8>) -> BlobResult<String> {
        let handle = Uuid::new_v4().simple().to_string();
        let path = self.blob_path(&handle)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Upload(format!("Failed to create blob directory: {}", e)))?;
        }

        fs::write(&path, data)
            .await
            .map_err(|e| BlobError::Upload(format!("Failed to write blob {}: {}", name, e)))?;

        debug!(handle = %handle, name = %name, "Stored blob on disk");
        Ok(handle)
    }

    async fn download(&self, handle: &str) -> BlobResult<Vec<u8>> {
        let path = self.blob_path(handle)?;

        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(handle.to_string()))
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn delete(&self, handle: &str) -> BlobResult<()> {
        let path = self.blob_path(handle)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(handle.to_string()))
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}
