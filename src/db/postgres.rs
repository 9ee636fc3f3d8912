/// PostgreSQL metadata store
///
/// Serves both the networked engine (DATABASE_URL) and the managed engine
/// (Cloud SQL unix socket under `/cloudsql/<instance>`).

use crate::config::{CloudSqlConfig, PoolConfig};
use crate::db::{
    DatabaseEngine, ImageRecord, LocationRecord, MetadataStore, NewImage, StoreError, StoreResult,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

const SELECT_JOINED: &str = r#"
    SELECT i.id, i.title, i.description, i.blob_handle, i.created_at, i.updated_at,
           l.latitude, l.longitude, l.name, l.country, l.city, l.address
    FROM images i
    LEFT JOIN locations l ON l.image_id = i.id
"#;

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PostgresMetadataStore {
    pool: PgPool,
    engine: DatabaseEngine,
}

impl PostgresMetadataStore {
    /// Connect using a `postgres://` URL
    pub async fn connect_url(database_url: &str, pool: &PoolConfig) -> StoreResult<Self> {
        let options = PgConnectOptions::from_str(database_url)?;
        Self::connect_with(options, pool, DatabaseEngine::NetworkedSql).await
    }

    /// Connect through the Cloud SQL unix socket
    pub async fn connect_cloud_sql(cloud: &CloudSqlConfig, pool: &PoolConfig) -> StoreResult<Self> {
        let options = PgConnectOptions::new()
            .socket(cloud.socket_dir.join(&cloud.connection_name))
            .port(5432)
            .username(&cloud.user)
            .password(&cloud.password)
            .database(&cloud.database);
        Self::connect_with(options, pool, DatabaseEngine::ManagedSql).await
    }

    async fn connect_with(
        options: PgConnectOptions,
        config: &PoolConfig,
        engine: DatabaseEngine,
    ) -> StoreResult<Self> {
        info!(
            engine = %engine,
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .max_lifetime(Duration::from_secs(config.max_lifetime))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!(engine = %engine, "Failed to connect to PostgreSQL: {}", e);
                StoreError::Database(e)
            })?;

        let store = Self { pool, engine };
        store.ping().await?;
        store.create_schema().await?;

        info!(engine = %engine, "PostgreSQL metadata store ready");
        Ok(store)
    }

    async fn create_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                seq BIGSERIAL,
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                blob_handle TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                image_id TEXT PRIMARY KEY REFERENCES images (id) ON DELETE CASCADE,
                latitude DOUBLE PRECISION NOT NULL DEFAULT 0,
                longitude DOUBLE PRECISION NOT NULL DEFAULT 0,
                name TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                city TEXT NOT NULL DEFAULT '',
                address TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn image_from_row(row: &PgRow) -> StoreResult<ImageRecord> {
        let location = LocationRecord {
            image_id: row.try_get("id")?,
            latitude: row.try_get::<Option<f64>, _>("latitude")?.unwrap_or_default(),
            longitude: row.try_get::<Option<f64>, _>("longitude")?.unwrap_or_default(),
            name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
            country: row.try_get::<Option<String>, _>("country")?.unwrap_or_default(),
            city: row.try_get::<Option<String>, _>("city")?.unwrap_or_default(),
            address: row.try_get::<Option<String>, _>("address")?.unwrap_or_default(),
        };

        Ok(ImageRecord {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            blob_handle: row.try_get("blob_handle")?,
            location: location.is_meaningful().then_some(location),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

async fn upsert_location(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    image_id: &str,
    location: &LocationRecord,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO locations (image_id, latitude, longitude, name, country, city, address)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (image_id) DO UPDATE SET
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            name = EXCLUDED.name,
            country = EXCLUDED.country,
            city = EXCLUDED.city,
            address = EXCLUDED.address
        "#,
    )
    .bind(image_id)
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(&location.name)
    .bind(&location.country)
    .bind(&location.city)
    .bind(&location.address)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    fn engine(&self) -> DatabaseEngine {
        self.engine
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_image(&self, image: &NewImage) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO images (id, title, description, blob_handle)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                blob_handle = EXCLUDED.blob_handle,
                updated_at = now()
            "#,
        )
        .bind(&image.id)
        .bind(&image.title)
        .bind(&image.description)
        .bind(&image.blob_handle)
        .execute(&mut *tx)
        .await?;

        if let Some(location) = &image.location {
            upsert_location(&mut tx, &image.id, location).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_image(&self, id: &str) -> StoreResult<ImageRecord> {
        let row = sqlx::query(&format!("{} WHERE i.id = $1", SELECT_JOINED))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("image {}", id)))?;

        Self::image_from_row(&row)
    }

    async fn get_current_image(&self) -> StoreResult<ImageRecord> {
        let row = sqlx::query(&format!(
            "{} ORDER BY i.created_at DESC, i.seq DESC LIMIT 1",
            SELECT_JOINED
        ))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("current image".to_string()))?;

        Self::image_from_row(&row)
    }

    async fn list_images(&self) -> StoreResult<Vec<ImageRecord>> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY i.created_at DESC, i.seq DESC",
            SELECT_JOINED
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::image_from_row).collect()
    }

    async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delete_image(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("image {}", id)));
        }
        Ok(())
    }

    async fn create_location(&self, location: &LocationRecord) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        upsert_location(&mut tx, &location.image_id, location).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_location(&self, image_id: &str) -> StoreResult<LocationRecord> {
        let row = sqlx::query(
            r#"
            SELECT image_id, latitude, longitude, name, country, city, address
            FROM locations WHERE image_id = $1
            "#,
        )
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("location for image {}", image_id)))?;

        Ok(LocationRecord {
            image_id: row.try_get("image_id")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            name: row.try_get("name")?,
            country: row.try_get("country")?,
            city: row.try_get("city")?,
            address: row.try_get("address")?,
        })
    }

    async fn update_location(&self, location: &LocationRecord) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE locations
            SET latitude = $2, longitude = $3, name = $4, country = $5, city = $6, address = $7
            WHERE image_id = $1
            "#,
        )
        .bind(&location.image_id)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(&location.name)
        .bind(&location.country)
        .bind(&location.city)
        .bind(&location.address)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "location for image {}",
                location.image_id
            )));
        }
        Ok(())
    }

    async fn delete_location(&self, image_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM locations WHERE image_id = $1")
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let pool = PoolConfig {
            connect_timeout: 1,
            min_connections: 0,
            ..PoolConfig::default()
        };

        let result =
            PostgresMetadataStore::connect_url("postgres://user:pw@127.0.0.1:1/images", &pool).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
