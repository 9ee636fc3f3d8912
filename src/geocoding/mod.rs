/// Location lookups
///
/// `LocationService` validates input and delegates to a `Geocoder`; the only
/// provider shipped is the Google Geocoding REST API.

pub mod google;

pub use google::GoogleGeocoder;

use crate::db::models::check_coordinates;
use crate::db::LocationRecord;
use crate::error::{AssetError, AssetResult};
use async_trait::async_trait;
use std::sync::Arc;

/// External geocoding provider
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Coordinates to a structured location
    async fn reverse(&self, latitude: f64, longitude: f64) -> AssetResult<LocationRecord>;

    /// Free-form place name to a structured location
    async fn forward(&self, name: &str) -> AssetResult<LocationRecord>;
}

/// Validating front for a geocoder
#[derive(Clone)]
pub struct LocationService {
    geocoder: Arc<dyn Geocoder>,
}

impl LocationService {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    pub async fn location_from_coords(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> AssetResult<LocationRecord> {
        check_coordinates(latitude, longitude).map_err(AssetError::InvalidInput)?;
        self.geocoder.reverse(latitude, longitude).await
    }

    pub async fn location_from_name(&self, name: &str) -> AssetResult<LocationRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AssetError::InvalidInput(
                "Location name cannot be empty".to_string(),
            ));
        }
        self.geocoder.forward(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn reverse(&self, latitude: f64, longitude: f64) -> AssetResult<LocationRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LocationRecord {
                latitude,
                longitude,
                name: "Somewhere".to_string(),
                ..Default::default()
            })
        }

        async fn forward(&self, name: &str) -> AssetResult<LocationRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LocationRecord {
                name: name.to_string(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_invalid_coordinates_never_reach_provider() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let service = LocationService::new(geocoder.clone());

        for (lat, lng) in [(91.0, 0.0), (0.0, 181.0), (f64::NAN, 0.0)] {
            assert!(matches!(
                service.location_from_coords(lat, lng).await,
                Err(AssetError::InvalidInput(_))
            ));
        }
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let service = LocationService::new(geocoder.clone());

        assert!(matches!(
            service.location_from_name("   ").await,
            Err(AssetError::InvalidInput(_))
        ));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_input_delegates() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let service = LocationService::new(geocoder.clone());

        let location = service.location_from_coords(48.8566, 2.3522).await.unwrap();
        assert_eq!(location.latitude, 48.8566);

        let location = service.location_from_name(" Paris ").await.unwrap();
        assert_eq!(location.name, "Paris");
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }
}
