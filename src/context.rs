/// Application context and dependency wiring
use crate::{
    blob_store::{build_blob_client, BlobClient},
    config::ServerConfig,
    coordinator::AssetCoordinator,
    db::{select_backend, MetadataStore},
    error::{AssetError, AssetResult},
    geocoding::{Geocoder, GoogleGeocoder, LocationService},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub coordinator: Arc<AssetCoordinator>,
    pub locations: LocationService,
}

impl AppContext {
    /// Create a new application context from configuration.
    ///
    /// Backend selection happens here, once, before any traffic is served.
    pub async fn new(config: ServerConfig) -> AssetResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AssetError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let store = select_backend(&config.database).await?;
        let blobs = build_blob_client(&config.blobstore, http.clone());
        let geocoder: Arc<dyn Geocoder> = Arc::new(GoogleGeocoder::new(
            http,
            config.geocoding.api_key.clone(),
            config.geocoding.base_url.clone(),
        ));

        info!(
            engine = %store.engine(),
            orphan_policy = ?config.coordinator.orphan_policy,
            "Application context initialized"
        );

        Ok(Self::from_parts(config, store, blobs, geocoder))
    }

    /// Assemble a context from already constructed collaborators
    pub fn from_parts(
        config: ServerConfig,
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobClient>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let coordinator = Arc::new(AssetCoordinator::new(
            blobs,
            store,
            config.coordinator.orphan_policy,
        ));

        Self {
            config: Arc::new(config),
            coordinator,
            locations: LocationService::new(geocoder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::db::DatabaseEngine;

    #[tokio::test]
    async fn test_context_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(test_config(dir.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(ctx.coordinator.store().engine(), DatabaseEngine::EmbeddedFile);
        assert_eq!(ctx.coordinator.count().await.unwrap(), 0);
    }
}
