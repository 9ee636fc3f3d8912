/// Google Geocoding API client
use crate::db::LocationRecord;
use crate::error::{AssetError, AssetResult};
use crate::geocoding::Geocoder;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

/// City and country from address components; province stands in for city
fn apply_components(location: &mut LocationRecord, components: &[AddressComponent]) {
    for component in components {
        for kind in &component.types {
            match kind.as_str() {
                "locality" => location.city = component.long_name.clone(),
                "country" => location.country = component.long_name.clone(),
                "administrative_area_level_1" if location.city.is_empty() => {
                    location.city = component.long_name.clone()
                }
                _ => {}
            }
        }
    }

    if location.city.is_empty() {
        location.city = "Unknown City".to_string();
    }
    if location.country.is_empty() {
        location.country = "Unknown Country".to_string();
    }
}

pub struct GoogleGeocoder {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleGeocoder {
    pub fn new(http: reqwest::Client, api_key: String, base_url: String) -> Self {
        Self {
            http,
            api_key,
            base_url,
        }
    }

    async fn lookup(&self, query: &[(&str, String)]) -> AssetResult<GeocodeResult> {
        let response = self
            .http
            .get(&self.base_url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| AssetError::Geocoding(format!("geocoding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AssetError::Geocoding(format!(
                "geocoding provider returned {}",
                response.status()
            )));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| AssetError::Geocoding(format!("malformed geocoding response: {}", e)))?;

        debug!(status = %body.status, results = body.results.len(), "Geocoding response");

        match body.status.as_str() {
            "OK" => body
                .results
                .into_iter()
                .next()
                .ok_or_else(|| AssetError::Geocoding("no results found".to_string())),
            "ZERO_RESULTS" => Err(AssetError::Geocoding("no results found".to_string())),
            status => Err(AssetError::Geocoding(format!(
                "{}: {}",
                status,
                body.error_message.unwrap_or_default()
            ))),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> AssetResult<LocationRecord> {
        let result = self
            .lookup(&[("latlng", format!("{},{}", latitude, longitude))])
            .await?;

        let mut location = LocationRecord {
            latitude,
            longitude,
            address: result.formatted_address,
            ..Default::default()
        };
        apply_components(&mut location, &result.address_components);
        location.name = location.city.clone();
        Ok(location)
    }

    async fn forward(&self, name: &str) -> AssetResult<LocationRecord> {
        let result = self.lookup(&[("address", name.to_string())]).await?;

        let mut location = LocationRecord {
            name: name.to_string(),
            latitude: result.geometry.location.lat,
            longitude: result.geometry.location.lng,
            address: result.formatted_address,
            ..Default::default()
        };
        apply_components(&mut location, &result.address_components);
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn fake_geocoder(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        if params.get("address").map(String::as_str) == Some("Atlantis") {
            return Json(json!({ "status": "ZERO_RESULTS", "results": [] }));
        }

        Json(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Paris, France",
                "geometry": { "location": { "lat": 48.8566, "lng": 2.3522 } },
                "address_components": [
                    { "long_name": "Île-de-France", "types": ["administrative_area_level_1", "political"] },
                    { "long_name": "Paris", "types": ["locality", "political"] },
                    { "long_name": "France", "types": ["country", "political"] }
                ]
            }]
        }))
    }

    async fn spawn() -> GoogleGeocoder {
        let app = Router::new().route("/geocode", get(fake_geocoder));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        GoogleGeocoder::new(
            reqwest::Client::new(),
            "test-key".to_string(),
            format!("http://{}/geocode", addr),
        )
    }

    #[tokio::test]
    async fn test_reverse_names_location_after_city() {
        let geocoder = spawn().await;
        let location = geocoder.reverse(48.8566, 2.3522).await.unwrap();

        assert_eq!(location.city, "Paris");
        assert_eq!(location.country, "France");
        assert_eq!(location.name, "Paris");
        assert_eq!(location.address, "Paris, France");
    }

    #[tokio::test]
    async fn test_forward_keeps_queried_name() {
        let geocoder = spawn().await;
        let location = geocoder.forward("Eiffel Tower").await.unwrap();

        assert_eq!(location.name, "Eiffel Tower");
        assert_eq!(location.latitude, 48.8566);
        assert_eq!(location.longitude, 2.3522);
    }

    #[tokio::test]
    async fn test_zero_results_is_geocoding_error() {
        let geocoder = spawn().await;
        assert!(matches!(
            geocoder.forward("Atlantis").await,
            Err(AssetError::Geocoding(_))
        ));
    }

    #[test]
    fn test_component_defaults() {
        let mut location = LocationRecord::default();
        apply_components(&mut location, &[]);
        assert_eq!(location.city, "Unknown City");
        assert_eq!(location.country, "Unknown Country");
    }
}
