/// Embedded SQLite metadata store
use crate::db::{
    DatabaseEngine, ImageRecord, LocationRecord, MetadataStore, NewImage, StoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SELECT_JOINED: &str = r#"
    SELECT i.id, i.title, i.description, i.blob_handle, i.created_at, i.updated_at,
           l.latitude, l.longitude, l.name, l.country, l.city, l.address
    FROM images i
    LEFT JOIN locations l ON l.image_id = i.id
"#;

/// SQLite-backed store. A single connection serializes writes; an in-memory
/// database lives exactly as long as that connection.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path`; `:memory:` for in-memory
    pub async fn connect(path: &str) -> StoreResult<Self> {
        let base = if path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
                }
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };
        let options = base
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!(path = %path, "SQLite metadata store ready");
        Ok(store)
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                blob_handle TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                image_id TEXT PRIMARY KEY,
                latitude REAL NOT NULL DEFAULT 0,
                longitude REAL NOT NULL DEFAULT 0,
                name TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                city TEXT NOT NULL DEFAULT '',
                address TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (image_id) REFERENCES images (id) ON DELETE CASCADE
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

    fn image_from_row(row: &SqliteRow) -> StoreResult<ImageRecord> {
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
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::EmbeddedFile
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_image(&self, image: &NewImage) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO images (id, title, description, blob_handle, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                blob_handle = excluded.blob_handle,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&image.id)
        .bind(&image.title)
        .bind(&image.description)
        .bind(&image.blob_handle)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(location) = &image.location {
            upsert_location(&mut tx, &image.id, location).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_image(&self, id: &str) -> StoreResult<ImageRecord> {
        let row = sqlx::query(&format!("{} WHERE i.id = ?1", SELECT_JOINED))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("image {}", id)))?;

        Self::image_from_row(&row)
    }

    async fn get_current_image(&self) -> StoreResult<ImageRecord> {
        let row = sqlx::query(&format!(
            "{} ORDER BY i.created_at DESC, i.rowid DESC LIMIT 1",
            SELECT_JOINED
        ))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("current image".to_string()))?;

        Self::image_from_row(&row)
    }

    async fn list_images(&self) -> StoreResult<Vec<ImageRecord>> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY i.created_at DESC, i.rowid DESC",
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
        let result = sqlx::query("DELETE FROM images WHERE id = ?1")
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
            FROM locations WHERE image_id = ?1
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
            SET latitude = ?2, longitude = ?3, name = ?4, country = ?5, city = ?6, address = ?7
            WHERE image_id = ?1
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
        sqlx::query("DELETE FROM locations WHERE image_id = ?1")
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn upsert_location(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    image_id: &str,
    location: &LocationRecord,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO locations (image_id, latitude, longitude, name, country, city, address)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (image_id) DO UPDATE SET
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            name = excluded.name,
            country = excluded.country,
            city = excluded.city,
            address = excluded.address
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
