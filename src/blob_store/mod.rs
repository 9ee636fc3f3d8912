/// Blob Storage Clients
///
/// Opaque byte payloads in a remote (or local) object store, addressed by
/// the handle returned from `upload`. Implementations do not retry and do
/// not cache.

pub mod disk;
pub mod drive;
pub mod token;

pub use disk::DiskBlobClient;
pub use drive::DriveBlobClient;
pub use token::{MetadataServerToken, RefreshingToken, StaticToken, TokenSource};

use crate::config::{BlobstoreConfig, DriveCredentials};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Blob store errors
#[derive(Error, Debug)]
pub enum BlobError {
    /// Handle does not name a stored blob
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Upload rejected (transport, quota, auth)
    #[error("upload failed: {0}")]
    Upload(String),

    /// Credentials could not be obtained
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Any other remote failure
    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Blob store client trait
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Store `data` under a human-readable `name`; returns the opaque handle
    async fn upload(&self, name: &str, data: Vec<u8>) -> BlobResult<String>;

    /// Fetch the bytes behind `handle`
    async fn download(&self, handle: &str) -> BlobResult<Vec<u8>>;

    /// Remove the blob. An absent handle is reported as `NotFound`.
    async fn delete(&self, handle: &str) -> BlobResult<()>;
}

/// Build the configured blob client
pub fn build_blob_client(
    config: &BlobstoreConfig,
    http: reqwest::Client,
) -> Arc<dyn BlobClient> {
    match config {
        BlobstoreConfig::Disk { location } => Arc::new(DiskBlobClient::new(location.clone())),
        BlobstoreConfig::Drive {
            folder_id,
            api_base,
            upload_base,
            credentials,
        } => {
            let tokens: Arc<dyn TokenSource> = match credentials {
                DriveCredentials::Static { access_token } => {
                    Arc::new(StaticToken::new(access_token.clone()))
                }
                DriveCredentials::Refresh {
                    client_id,
                    client_secret,
                    refresh_token,
                    token_url,
                } => Arc::new(RefreshingToken::new(
                    http.clone(),
                    token_url.clone(),
                    client_id.clone(),
                    client_secret.clone(),
                    refresh_token.clone(),
                )),
            };

            Arc::new(DriveBlobClient::new(
                http,
                tokens,
                folder_id.clone(),
                api_base.clone(),
                upload_base.clone(),
            ))
        }
    }
}
