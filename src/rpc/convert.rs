/// Conversions between wire messages and domain records
use crate::db::{ImageRecord, LocationRecord};
use crate::error::{AssetError, AssetResult};
use crate::proto;
use chrono::{DateTime, SecondsFormat, Utc};

pub fn timestamp_to_wire(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn timestamp_from_wire(value: &str) -> AssetResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AssetError::Internal(format!("invalid timestamp {:?}: {}", value, e)))
}

impl From<LocationRecord> for proto::Location {
    fn from(location: LocationRecord) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            name: location.name,
            country: location.country,
            city: location.city,
            address: location.address,
        }
    }
}

impl From<proto::Location> for LocationRecord {
    fn from(location: proto::Location) -> Self {
        Self {
            image_id: String::new(),
            latitude: location.latitude,
            longitude: location.longitude,
            name: location.name,
            country: location.country,
            city: location.city,
            address: location.address,
        }
    }
}

impl From<ImageRecord> for proto::ImageMetadata {
    fn from(record: ImageRecord) -> Self {
        Self {
            created_at: timestamp_to_wire(&record.created_at),
            updated_at: timestamp_to_wire(&record.updated_at),
            id: record.id,
            title: record.title,
            description: record.description,
            blob_handle: record.blob_handle,
            location: record.location.map(Into::into),
        }
    }
}

impl TryFrom<proto::ImageMetadata> for ImageRecord {
    type Error = AssetError;

    fn try_from(meta: proto::ImageMetadata) -> AssetResult<Self> {
        let id = meta.id;
        let location = meta.location.map(|location| LocationRecord {
            image_id: id.clone(),
            ..location.into()
        });

        Ok(Self {
            created_at: timestamp_from_wire(&meta.created_at)?,
            updated_at: timestamp_from_wire(&meta.updated_at)?,
            id,
            title: meta.title,
            description: meta.description,
            blob_handle: meta.blob_handle,
            location,
        })
    }
}
