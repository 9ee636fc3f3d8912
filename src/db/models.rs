/// Image and location records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Persisted image metadata, optionally joined with its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Opaque handle returned by the blob store
    pub blob_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Geographic position of an image (1:1 with its image)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct LocationRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(default)]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
}

impl LocationRecord {
    /// Reject NaN/infinite values and out-of-range coordinates
    pub fn check_coordinates(&self) -> Result<(), String> {
        check_coordinates(self.latitude, self.longitude)
    }

    /// Whether a joined row carries any location data
    pub fn is_meaningful(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0 || !self.name.is_empty()
    }
}

/// Coordinate validation shared by uploads and reverse geocoding
pub fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), String> {
    if !latitude.is_finite() {
        return Err("latitude must be a finite number".to_string());
    }
    if !longitude.is_finite() {
        return Err("longitude must be a finite number".to_string());
    }

    let candidate = LocationRecord {
        latitude,
        longitude,
        ..Default::default()
    };
    candidate.validate().map_err(|errors| {
        let fields = errors.field_errors();
        if fields.contains_key("latitude") {
            format!("latitude {} out of range [-90, 90]", latitude)
        } else {
            format!("longitude {} out of range [-180, 180]", longitude)
        }
    })
}

/// Write model for `MetadataStore::create_image`
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub id: String,
    pub title: String,
    pub description: String,
    pub blob_handle: String,
    pub location: Option<LocationRecord>,
}
