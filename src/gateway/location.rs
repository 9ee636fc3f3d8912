/// Location lookup endpoints
use crate::db::LocationRecord;
use crate::error::{AssetError, AssetResult};
use crate::gateway::{with_budget, GatewayState};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const LOCATION_BUDGET: Duration = Duration::from_secs(5);

pub fn routes() -> Router<GatewayState> {
    Router::new()
        .route("/api/v1/location/coords", get(location_from_coords))
        .route("/api/v1/location/name", get(location_from_name))
}

#[derive(Debug, Deserialize)]
pub struct CoordsQuery {
    lat: Option<String>,
    lng: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LocationEnvelope {
    pub success: bool,
    pub message: String,
    pub location: LocationRecord,
}

fn envelope(location: LocationRecord) -> Json<LocationEnvelope> {
    Json(LocationEnvelope {
        success: true,
        message: "Location retrieved successfully".to_string(),
        location,
    })
}

/// GET /api/v1/location/coords?lat=&lng=
async fn location_from_coords(
    State(state): State<GatewayState>,
    Query(query): Query<CoordsQuery>,
) -> AssetResult<Json<LocationEnvelope>> {
    let (Some(lat), Some(lng)) = (
        query.lat.filter(|v| !v.trim().is_empty()),
        query.lng.filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(AssetError::InvalidInput(
            "Both lat and lng parameters are required".to_string(),
        ));
    };

    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|_| AssetError::InvalidInput("Invalid latitude value".to_string()))?;
    let longitude: f64 = lng
        .trim()
        .parse()
        .map_err(|_| AssetError::InvalidInput("Invalid longitude value".to_string()))?;

    let location = with_budget(
        "reverse geocode",
        LOCATION_BUDGET,
        state
            .api
            .location_from_coords(latitude, longitude, LOCATION_BUDGET),
    )
    .await?;
    Ok(envelope(location))
}

/// GET /api/v1/location/name?name=
async fn location_from_name(
    State(state): State<GatewayState>,
    Query(query): Query<NameQuery>,
) -> AssetResult<Json<LocationEnvelope>> {
    let name = query.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(AssetError::InvalidInput(
            "name parameter is required".to_string(),
        ));
    }

    let location = with_budget(
        "geocode",
        LOCATION_BUDGET,
        state.api.location_from_name(&name, LOCATION_BUDGET),
    )
    .await?;
    Ok(envelope(location))
}
