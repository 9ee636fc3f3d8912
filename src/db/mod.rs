/// Metadata store layer
///
/// Relational persistence for image and location records behind a single
/// engine-agnostic trait. Engines: embedded SQLite (file or in-memory) and
/// PostgreSQL (direct URL or Cloud SQL unix socket).

pub mod models;
pub mod postgres;
pub mod selector;
pub mod sqlite;

pub use models::{ImageRecord, LocationRecord, NewImage};
pub use postgres::PostgresMetadataStore;
pub use selector::select_backend;
pub use sqlite::SqliteMetadataStore;

use crate::error::AssetError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Metadata store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which relational engine backs the metadata store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseEngine {
    /// SQLite file or `:memory:`
    EmbeddedFile,
    /// PostgreSQL reached through DATABASE_URL
    NetworkedSql,
    /// PostgreSQL reached through the Cloud SQL unix socket
    ManagedSql,
}

impl DatabaseEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::EmbeddedFile => "embedded-file",
            DatabaseEngine::NetworkedSql => "networked-sql",
            DatabaseEngine::ManagedSql => "managed-sql",
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseEngine {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "embedded-file" | "embedded" => Ok(DatabaseEngine::EmbeddedFile),
            "postgres" | "postgresql" | "networked-sql" => Ok(DatabaseEngine::NetworkedSql),
            "cloudsql" | "managed-sql" => Ok(DatabaseEngine::ManagedSql),
            other => Err(AssetError::Config(format!(
                "unsupported database type: {}",
                other
            ))),
        }
    }
}

/// Engine-agnostic metadata store.
///
/// Reads that join locations return `location: None` when the joined row is
/// missing or carries zero coordinates and an empty name.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Engine serving this store
    fn engine(&self) -> DatabaseEngine;

    /// Round-trip a trivial query
    async fn ping(&self) -> StoreResult<()>;

    /// Insert or overwrite an image (and its location, when given) atomically.
    /// `created_at` survives an overwrite; `updated_at` is refreshed.
    async fn create_image(&self, image: &NewImage) -> StoreResult<()>;

    async fn get_image(&self, id: &str) -> StoreResult<ImageRecord>;

    /// Newest image by `created_at`, later insertion first on ties
    async fn get_current_image(&self) -> StoreResult<ImageRecord>;

    /// All images, newest first
    async fn list_images(&self) -> StoreResult<Vec<ImageRecord>>;

    async fn count(&self) -> StoreResult<i64>;

    /// Delete an image and cascade its location. `NotFound` when no row matched.
    async fn delete_image(&self, id: &str) -> StoreResult<()>;

    /// Upsert a location for an existing image
    async fn create_location(&self, location: &LocationRecord) -> StoreResult<()>;

    async fn get_location(&self, image_id: &str) -> StoreResult<LocationRecord>;

    /// `NotFound` when the image has no location row
    async fn update_location(&self, location: &LocationRecord) -> StoreResult<()>;

    async fn delete_location(&self, image_id: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_parsing_accepts_legacy_names() {
        assert_eq!("sqlite".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::EmbeddedFile);
        assert_eq!("postgres".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::NetworkedSql);
        assert_eq!("cloudsql".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::ManagedSql);
        assert_eq!("managed-sql".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::ManagedSql);
        assert!("mongodb".parse::<DatabaseEngine>().is_err());
    }
}
