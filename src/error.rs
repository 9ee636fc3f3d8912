/// Unified error types for the image asset service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tonic::{metadata::MetadataValue, Code, Status};

use crate::blob_store::BlobError;
use crate::db::StoreError;

/// gRPC metadata key carrying the exact error kind across the RPC hop
pub const ERROR_KIND_METADATA_KEY: &str = "x-error-kind";

/// Main error type surfaced by the coordinator and both protocol surfaces
#[derive(Error, Debug)]
pub enum AssetError {
    /// Requested image or location does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed caller input (bad coordinates, empty payload, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Blob store rejected or failed an upload/delete
    #[error("Upload error: {0}")]
    Upload(String),

    /// Metadata store failed a write or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No metadata backend could be constructed
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// External geocoding provider failed
    #[error("Geocoding error: {0}")]
    Geocoding(String),

    /// Per-call deadline expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssetError {
    /// Stable machine-readable kind used in JSON bodies and RPC metadata
    pub fn kind(&self) -> &'static str {
        match self {
            AssetError::NotFound(_) => "NotFound",
            AssetError::InvalidInput(_) => "InvalidInput",
            AssetError::Upload(_) => "UploadError",
            AssetError::Persistence(_) => "PersistenceError",
            AssetError::BackendUnavailable(_) => "BackendUnavailable",
            AssetError::Geocoding(_) => "GeocodingError",
            AssetError::Timeout(_) => "Timeout",
            AssetError::Config(_) => "ConfigError",
            AssetError::Internal(_) => "InternalServerError",
        }
    }

    /// Detail message without the display prefix
    pub fn detail(&self) -> &str {
        match self {
            AssetError::NotFound(m)
            | AssetError::InvalidInput(m)
            | AssetError::Upload(m)
            | AssetError::Persistence(m)
            | AssetError::BackendUnavailable(m)
            | AssetError::Geocoding(m)
            | AssetError::Timeout(m)
            | AssetError::Config(m)
            | AssetError::Internal(m) => m,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AssetError::NotFound(_) => StatusCode::NOT_FOUND,
            AssetError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AssetError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rebuild an error received from the RPC service.
    ///
    /// The `x-error-kind` metadata entry wins; otherwise the status code is
    /// mapped onto the closest kind.
    pub fn from_status(status: &Status) -> Self {
        let message = status.message().to_string();
        let kind = status
            .metadata()
            .get(ERROR_KIND_METADATA_KEY)
            .and_then(|v| v.to_str().ok());

        match kind {
            Some("NotFound") => AssetError::NotFound(message),
            Some("InvalidInput") => AssetError::InvalidInput(message),
            Some("UploadError") => AssetError::Upload(message),
            Some("PersistenceError") => AssetError::Persistence(message),
            Some("BackendUnavailable") => AssetError::BackendUnavailable(message),
            Some("GeocodingError") => AssetError::Geocoding(message),
            Some("Timeout") => AssetError::Timeout(message),
            Some("ConfigError") => AssetError::Config(message),
            Some("InternalServerError") => AssetError::Internal(message),
            _ => match status.code() {
                Code::NotFound => AssetError::NotFound(message),
                Code::InvalidArgument => AssetError::InvalidInput(message),
                Code::DeadlineExceeded | Code::Cancelled => AssetError::Timeout(message),
                Code::Unavailable => AssetError::BackendUnavailable(message),
                _ => AssetError::Internal(message),
            },
        }
    }
}

/// JSON error body returned by the HTTP surface
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Convert AssetError to HTTP response
impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            success: false,
            error: self.kind().to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<AssetError> for Status {
    fn from(err: AssetError) -> Self {
        let code = match &err {
            AssetError::NotFound(_) => Code::NotFound,
            AssetError::InvalidInput(_) => Code::InvalidArgument,
            AssetError::Timeout(_) => Code::DeadlineExceeded,
            AssetError::BackendUnavailable(_) => Code::Unavailable,
            AssetError::Config(_) => Code::FailedPrecondition,
            _ => Code::Internal,
        };

        let mut status = Status::new(code, err.detail().to_string());
        status.metadata_mut().insert(
            ERROR_KIND_METADATA_KEY,
            MetadataValue::from_static(err.kind()),
        );
        status
    }
}

impl From<StoreError> for AssetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AssetError::NotFound(msg),
            StoreError::InvalidRecord(msg) => AssetError::InvalidInput(msg),
            StoreError::Config(msg) => AssetError::Config(msg),
            other => AssetError::Persistence(other.to_string()),
        }
    }
}

impl From<BlobError> for AssetError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(msg) => AssetError::NotFound(msg),
            other => AssetError::Upload(other.to_string()),
        }
    }
}

/// Result type alias for service operations
pub type AssetResult<T> = Result<T, AssetError>;
