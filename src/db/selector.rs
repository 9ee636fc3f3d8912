/// Backend selection with ordered fallback
use crate::config::DatabaseConfig;
use crate::db::{
    DatabaseEngine, MetadataStore, PostgresMetadataStore, SqliteMetadataStore, StoreError,
};
use crate::error::{AssetError, AssetResult};
use crate::metrics;
use std::sync::Arc;
use tracing::{info, warn};

/// Construct a single engine from configuration
pub async fn open_engine(
    engine: DatabaseEngine,
    config: &DatabaseConfig,
) -> Result<Arc<dyn MetadataStore>, StoreError> {
    match engine {
        DatabaseEngine::EmbeddedFile => {
            let store = SqliteMetadataStore::connect(&config.sqlite_path).await?;
            Ok(Arc::new(store))
        }
        DatabaseEngine::NetworkedSql => {
            let store =
                PostgresMetadataStore::connect_url(&config.database_url, &config.pool).await?;
            Ok(Arc::new(store))
        }
        DatabaseEngine::ManagedSql => {
            let cloud = config.cloud_sql.as_ref().ok_or_else(|| {
                StoreError::Config("CLOUD_SQL_CONNECTION_NAME is not set".to_string())
            })?;
            let store = PostgresMetadataStore::connect_cloud_sql(cloud, &config.pool).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Try the primary engine, then each fallback in order.
///
/// Runs once at startup. Every failure is logged; the first engine that
/// connects wins. Exhausting the chain yields `BackendUnavailable`.
pub async fn select_backend(config: &DatabaseConfig) -> AssetResult<Arc<dyn MetadataStore>> {
    let chain = std::iter::once(config.primary).chain(config.fallbacks.iter().copied());
    let mut failures = Vec::new();

    for (attempt, engine) in chain.enumerate() {
        match open_engine(engine, config).await {
            Ok(store) => {
                metrics::BACKEND_SELECTIONS_TOTAL
                    .with_label_values(&[engine.as_str(), "success"])
                    .inc();
                if attempt > 0 {
                    info!(
                        engine = %engine,
                        primary = %config.primary,
                        "Primary metadata backend unavailable, using fallback"
                    );
                } else {
                    info!(engine = %engine, "Metadata backend selected");
                }
                return Ok(store);
            }
            Err(e) => {
                metrics::BACKEND_SELECTIONS_TOTAL
                    .with_label_values(&[engine.as_str(), "failure"])
                    .inc();
                warn!(engine = %engine, error = %e, "Metadata backend failed to initialize");
                failures.push(format!("{}: {}", engine, e));
            }
        }
    }

    Err(AssetError::BackendUnavailable(failures.join("; ")))
}
