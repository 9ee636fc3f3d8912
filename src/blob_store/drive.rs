/// Google Drive v3 blob client
use crate::blob_store::{BlobClient, BlobError, BlobResult, TokenSource};
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Uploaded file description returned by Drive
#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// Stores blobs as files inside one Drive folder; the handle is the Drive file id
pub struct DriveBlobClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    folder_id: String,
    api_base: String,
    upload_base: String,
}

impl DriveBlobClient {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        folder_id: String,
        api_base: String,
        upload_base: String,
    ) -> Self {
        Self {
            http,
            tokens,
            folder_id,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    /// multipart/related body: JSON metadata part, then the media part
    fn multipart_body(&self, name: &str, data: &[u8]) -> (String, Vec<u8>) {
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let mut metadata = json!({ "name": name });
        if !self.folder_id.is_empty() {
            metadata["parents"] = json!([self.folder_id]);
        }

        let mut body = Vec::with_capacity(data.len() + 512);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        (boundary, body)
    }

    fn file_url(&self, handle: &str) -> String {
        format!("{}/files/{}", self.api_base, handle)
    }
}

#[async_trait]
impl BlobClient for DriveBlobClient {
    async fn upload(&self, name: &str, data: Vec<u8>) -> BlobResult<String> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| BlobError::Upload(e.to_string()))?;
        let (boundary, body) = self.multipart_body(name, &data);

        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .bearer_auth(token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| BlobError::Upload(format!("Drive upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, name = %name, "Drive rejected upload");
            return Err(BlobError::Upload(format!("Drive returned {}: {}", status, detail)));
        }

        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| BlobError::Upload(format!("Malformed Drive response: {}", e)))?;

        debug!(handle = %file.id, name = %name, "Uploaded blob to Drive");
        Ok(file.id)
    }

    async fn download(&self, handle: &str) -> BlobResult<Vec<u8>> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .get(self.file_url(handle))
            .query(&[("alt", "media")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BlobError::NotFound(handle.to_string())),
            status if status.is_success() => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| BlobError::Transport(e.to_string())),
            status => Err(BlobError::Transport(format!(
                "Drive download of {} returned {}",
                handle, status
            ))),
        }
    }

    async fn delete(&self, handle: &str) -> BlobResult<()> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .delete(self.file_url(handle))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BlobError::NotFound(handle.to_string())),
            status if status.is_success() => Ok(()),
            status => Err(BlobError::Transport(format!(
                "Drive delete of {} returned {}",
                handle, status
            ))),
        }
    }
}
